//! Provider catalog.
//!
//! Provider CRUD and storage belong to the host application; the proxy only
//! needs to resolve `(app, provider id)` to an upstream endpoint and its
//! credentials. [`ProviderCatalog`] is that seam, [`StaticCatalog`] the
//! config-file backed implementation.

pub mod catalog;

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::config::{AppType, ProviderConfig};

pub use catalog::{ProviderCatalog, StaticCatalog};

/// Headers that carry client credentials and get replaced by the provider's.
const CREDENTIAL_HEADERS: [&str; 3] = ["authorization", "x-api-key", "x-goog-api-key"];

/// A resolved upstream provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    pub id: String,
    pub app_type: AppType,
    pub name: String,
    pub base_url: Url,
    pub api_key: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl From<ProviderConfig> for Provider {
    fn from(config: ProviderConfig) -> Self {
        Self {
            name: config.name.unwrap_or_else(|| config.id.clone()),
            id: config.id,
            app_type: config.app_type,
            base_url: config.base_url,
            api_key: config.api_key,
            headers: config.headers,
        }
    }
}

impl Provider {
    /// Upstream URL for a client path such as `/v1/messages?beta=true`.
    ///
    /// The base URL's own path is kept as a prefix.
    pub fn upstream_url(&self, path_and_query: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let suffix = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{path_and_query}")
        };
        Url::parse(&format!("{base}{suffix}"))
    }

    /// Swap the client's credentials for this provider's and add extra headers.
    ///
    /// Without a configured key the client's credentials pass through.
    pub fn apply_credentials(&self, headers: &mut HeaderMap) {
        if let Some(key) = self.api_key.as_deref() {
            for name in CREDENTIAL_HEADERS {
                headers.remove(name);
            }
            let (name, value) = match self.app_type {
                AppType::Claude => ("x-api-key", key.to_string()),
                AppType::Gemini => ("x-goog-api-key", key.to_string()),
                AppType::Codex | AppType::OpenCode | AppType::OpenClaw => {
                    ("authorization", format!("Bearer {key}"))
                }
            };
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(name), value);
                }
                Err(_) => tracing::warn!(provider = %self.id, "API key is not a valid header value"),
            }
        }

        for (name, value) in &self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(provider = %self.id, header = %name, "Skipping invalid provider header"),
            }
        }
    }
}
