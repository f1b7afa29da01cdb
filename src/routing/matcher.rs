//! App detection.
//!
//! # Responsibilities
//! - Decide which app an inbound request belongs to
//! - Strip the routing prefix before the path is forwarded
//!
//! # Design Decisions
//! - Explicit `x-app-type` header wins, then a `/{app}/` prefix, then the
//!   well-known API path of each vendor
//! - Path matching is case-sensitive; header values are not
//! - First match wins

use axum::http::{HeaderMap, Uri};

use crate::config::AppType;

pub const X_APP_TYPE: &str = "x-app-type";

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMatch {
    pub app_type: AppType,
    /// Path and query to forward upstream.
    pub forward_path: String,
}

/// Trait for mapping a request to an app.
pub trait AppMatcher: Send + Sync + std::fmt::Debug {
    fn match_app(&self, headers: &HeaderMap, uri: &Uri) -> Option<AppMatch>;
}

fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// Remove a leading `/{app}` segment, keeping the query.
fn strip_app_prefix(app: AppType, uri: &Uri) -> Option<String> {
    let prefix = format!("/{}", app.as_str());
    let rest = uri.path().strip_prefix(&prefix)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let path = if rest.is_empty() { "/" } else { rest };
    Some(match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    })
}

/// Matches the `x-app-type` header.
#[derive(Debug, Clone, Default)]
pub struct HeaderMatcher;

impl AppMatcher for HeaderMatcher {
    fn match_app(&self, headers: &HeaderMap, uri: &Uri) -> Option<AppMatch> {
        let app_type: AppType = headers.get(X_APP_TYPE)?.to_str().ok()?.parse().ok()?;
        let forward_path = strip_app_prefix(app_type, uri).unwrap_or_else(|| path_and_query(uri));
        Some(AppMatch {
            app_type,
            forward_path,
        })
    }
}

/// Matches a leading `/{app}/` path segment.
#[derive(Debug, Clone, Default)]
pub struct PrefixMatcher;

impl AppMatcher for PrefixMatcher {
    fn match_app(&self, _headers: &HeaderMap, uri: &Uri) -> Option<AppMatch> {
        AppType::ALL.into_iter().find_map(|app_type| {
            strip_app_prefix(app_type, uri).map(|forward_path| AppMatch {
                app_type,
                forward_path,
            })
        })
    }
}

/// Matches vendor API paths.
#[derive(Debug, Clone)]
pub struct ApiPathMatcher {
    prefixes: Vec<(&'static str, AppType)>,
}

impl Default for ApiPathMatcher {
    fn default() -> Self {
        Self {
            prefixes: vec![
                ("/v1/messages", AppType::Claude),
                ("/v1/responses", AppType::Codex),
                ("/v1/chat/completions", AppType::Codex),
                ("/v1beta/", AppType::Gemini),
            ],
        }
    }
}

impl AppMatcher for ApiPathMatcher {
    fn match_app(&self, _headers: &HeaderMap, uri: &Uri) -> Option<AppMatch> {
        let path = uri.path();
        self.prefixes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix))
            .map(|(_, app_type)| AppMatch {
                app_type: *app_type,
                forward_path: path_and_query(uri),
            })
    }
}

/// Ordered chain of matchers.
#[derive(Debug)]
pub struct AppResolver {
    matchers: Vec<Box<dyn AppMatcher>>,
}

impl AppResolver {
    pub fn new(matchers: Vec<Box<dyn AppMatcher>>) -> Self {
        Self { matchers }
    }

    pub fn resolve(&self, headers: &HeaderMap, uri: &Uri) -> Option<AppMatch> {
        self.matchers.iter().find_map(|m| m.match_app(headers, uri))
    }
}

impl Default for AppResolver {
    fn default() -> Self {
        Self::new(vec![
            Box::new(HeaderMatcher),
            Box::new(PrefixMatcher),
            Box::new(ApiPathMatcher::default()),
        ])
    }
}
