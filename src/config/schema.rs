//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! the API-facing types double as the JSON payloads of the admin API.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::resilience::circuit_breaker::CircuitBreakerConfig;

/// Coding-assistant client whose traffic the proxy routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Claude,
    Codex,
    Gemini,
    OpenCode,
    OpenClaw,
}

impl AppType {
    pub const ALL: [AppType; 5] = [
        AppType::Claude,
        AppType::Codex,
        AppType::Gemini,
        AppType::OpenCode,
        AppType::OpenClaw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppType::Claude => "claude",
            AppType::Codex => "codex",
            AppType::Gemini => "gemini",
            AppType::OpenCode => "opencode",
            AppType::OpenClaw => "openclaw",
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known application.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown app type: {0}")]
pub struct UnknownAppType(pub String);

impl FromStr for AppType {
    type Err = UnknownAppType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        AppType::ALL
            .into_iter()
            .find(|app| app.as_str() == lowered)
            .ok_or_else(|| UnknownAppType(s.to_string()))
    }
}

/// Root configuration for the failover proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration for the proxy itself.
    pub listener: ListenerConfig,

    /// Admin API (command boundary) settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Global circuit breaker template, applied to every app on update.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-app tunables keyed by app name (`[apps.claude]`).
    pub apps: BTreeMap<String, AppProxyConfig>,

    /// Provider used in single-target mode, keyed by app name.
    pub current_provider: BTreeMap<String, String>,

    /// Initial failover queues, keyed by app name, highest priority first.
    pub failover: BTreeMap<String, Vec<String>>,

    /// Upstream providers known to the proxy.
    pub providers: Vec<ProviderConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Listen address (e.g., "127.0.0.1").
    pub listen_address: String,

    /// Listen port. `0` picks an ephemeral port.
    pub listen_port: u16,

    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,

    /// Upstream connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Start the proxy server together with the admin API.
    pub auto_start: bool,

    /// Route upstream traffic through the system proxy (HTTP_PROXY etc.).
    pub use_system_proxy: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 15721,
            max_body_size: 32 * 1024 * 1024,
            connect_timeout_secs: 10,
            auto_start: false,
            use_system_proxy: false,
        }
    }
}

impl ListenerConfig {
    /// `address:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:15722".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Per-app proxy tunables.
///
/// The circuit breaker fields mirror [`CircuitBreakerConfig`]; the error rate
/// is a fraction in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppProxyConfig {
    pub auto_failover_enabled: bool,
    pub max_retries: u32,
    /// Seconds to wait for the first streamed byte.
    pub streaming_first_byte_timeout: u64,
    /// Maximum seconds between two streamed chunks.
    pub streaming_idle_timeout: u64,
    /// Total seconds for a non-streaming exchange.
    pub non_streaming_timeout: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_success_threshold: u32,
    pub circuit_timeout_seconds: u64,
    pub circuit_error_rate_threshold: f64,
    pub circuit_min_requests: u32,
}

impl Default for AppProxyConfig {
    fn default() -> Self {
        let breaker = CircuitBreakerConfig::default();
        Self {
            auto_failover_enabled: false,
            max_retries: 3,
            streaming_first_byte_timeout: 60,
            streaming_idle_timeout: 120,
            non_streaming_timeout: 600,
            circuit_failure_threshold: breaker.failure_threshold,
            circuit_success_threshold: breaker.success_threshold,
            circuit_timeout_seconds: breaker.timeout_seconds,
            circuit_error_rate_threshold: breaker.error_rate_threshold,
            circuit_min_requests: breaker.min_requests,
        }
    }
}

impl AppProxyConfig {
    /// The breaker settings embedded in this app config.
    pub fn breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_failure_threshold,
            success_threshold: self.circuit_success_threshold,
            timeout_seconds: self.circuit_timeout_seconds,
            error_rate_threshold: self.circuit_error_rate_threshold,
            min_requests: self.circuit_min_requests,
        }
    }

    /// Overwrite the embedded breaker settings.
    pub fn set_breaker(&mut self, breaker: &CircuitBreakerConfig) {
        self.circuit_failure_threshold = breaker.failure_threshold;
        self.circuit_success_threshold = breaker.success_threshold;
        self.circuit_timeout_seconds = breaker.timeout_seconds;
        self.circuit_error_rate_threshold = breaker.error_rate_threshold;
        self.circuit_min_requests = breaker.min_requests;
    }
}

/// Upstream provider definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Unique provider identifier within its app.
    pub id: String,

    /// App this provider serves.
    pub app_type: AppType,

    /// Display name (defaults to the id).
    #[serde(default)]
    pub name: Option<String>,

    /// Base URL; the client's request path is appended to it.
    pub base_url: Url,

    /// Credential injected in place of the client's own.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Extra headers sent with every upstream request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_type_parsing() {
        assert_eq!("claude".parse::<AppType>().unwrap(), AppType::Claude);
        assert_eq!("OpenCode".parse::<AppType>().unwrap(), AppType::OpenCode);
        assert!("cursor".parse::<AppType>().is_err());
        assert_eq!(AppType::OpenClaw.to_string(), "openclaw");
    }

    #[test]
    fn test_minimal_toml() {
        let raw = r#"
            [listener]
            listen_port = 18000

            [apps.claude]
            autoFailoverEnabled = true
            maxRetries = 2

            [current_provider]
            claude = "official"

            [failover]
            claude = ["official", "relay"]

            [[providers]]
            id = "official"
            app_type = "claude"
            base_url = "https://api.anthropic.com"
            api_key = "sk-test"
        "#;
        let config: ProxyConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.listener.listen_port, 18000);
        assert_eq!(config.listener.listen_address, "127.0.0.1");

        let claude = config.apps["claude"];
        assert!(claude.auto_failover_enabled);
        assert_eq!(claude.max_retries, 2);
        assert_eq!(claude.non_streaming_timeout, 600);

        assert_eq!(config.failover["claude"], vec!["official", "relay"]);
        assert_eq!(config.providers[0].app_type, AppType::Claude);
    }

    #[test]
    fn test_breaker_fields_roundtrip_through_app_config() {
        let mut app = AppProxyConfig::default();
        let breaker = CircuitBreakerConfig {
            failure_threshold: 7,
            success_threshold: 3,
            timeout_seconds: 90,
            error_rate_threshold: 0.25,
            min_requests: 20,
        };
        app.set_breaker(&breaker);
        assert_eq!(app.breaker(), breaker);
    }
}
