//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges of per-app tunables and breaker settings
//! - Check referential integrity (queues and current providers reference
//!   known providers, app keys name known apps)
//!
//! Every check collects into a list so callers see all violations at once.

use std::collections::HashSet;
use std::fmt::Display;

use serde::Serialize;

use crate::config::schema::{AppProxyConfig, AppType, ProxyConfig};
use crate::resilience::circuit_breaker::CircuitBreakerConfig;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One-line rendering of a list of violations.
pub fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_range<T>(errors: &mut Vec<ValidationError>, field: &str, value: T, min: T, max: T)
where
    T: PartialOrd + Display + Copy,
{
    // Written as a negated contains so NaN is rejected too.
    if !(min..=max).contains(&value) {
        errors.push(ValidationError::new(
            field,
            format!("must be between {} and {}, got {}", min, max, value),
        ));
    }
}

fn collect(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn breaker_errors(prefix: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| format!("{prefix}{name}");
    check_range(errors, &field("FailureThreshold"), breaker.failure_threshold, 1, 20);
    check_range(errors, &field("SuccessThreshold"), breaker.success_threshold, 1, 10);
    check_range(errors, &field("TimeoutSeconds"), breaker.timeout_seconds, 0, 300);
    check_range(errors, &field("ErrorRateThreshold"), breaker.error_rate_threshold, 0.0, 1.0);
    check_range(errors, &field("MinRequests"), breaker.min_requests, 5, 100);
}

/// Validate the ranges of a per-app config.
pub fn validate_app_config(config: &AppProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_range(&mut errors, "maxRetries", config.max_retries, 0, 10);
    check_range(
        &mut errors,
        "streamingFirstByteTimeout",
        config.streaming_first_byte_timeout,
        0,
        180,
    );
    check_range(&mut errors, "streamingIdleTimeout", config.streaming_idle_timeout, 0, 600);
    check_range(&mut errors, "nonStreamingTimeout", config.non_streaming_timeout, 0, 1800);
    breaker_errors("circuit", &config.breaker(), &mut errors);
    collect(errors)
}

/// Validate a standalone breaker config (same ranges as the per-app fields).
pub fn validate_breaker_config(config: &CircuitBreakerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut scoped = Vec::new();
    breaker_errors("", config, &mut scoped);
    // Field names read `failureThreshold` rather than `FailureThreshold`.
    for mut err in scoped {
        if let Some(first) = err.field.get(..1) {
            err.field = format!("{}{}", first.to_ascii_lowercase(), &err.field[1..]);
        }
        errors.push(err);
    }
    collect(errors)
}

/// Validate a whole configuration file.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.listen_address.trim().is_empty() {
        errors.push(ValidationError::new("listener.listen_address", "must not be empty"));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be greater than 0"));
    }
    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty"));
    }

    if let Err(nested) = validate_breaker_config(&config.circuit_breaker) {
        errors.extend(nested.into_iter().map(|mut e| {
            e.field = format!("circuit_breaker.{}", e.field);
            e
        }));
    }

    for (name, app) in &config.apps {
        if name.parse::<AppType>().is_err() {
            errors.push(ValidationError::new(format!("apps.{name}"), "unknown app type"));
        }
        if let Err(nested) = validate_app_config(app) {
            errors.extend(nested.into_iter().map(|mut e| {
                e.field = format!("apps.{name}.{}", e.field);
                e
            }));
        }
    }

    let mut seen = HashSet::new();
    for (index, provider) in config.providers.iter().enumerate() {
        if provider.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("providers[{index}].id"), "must not be empty"));
        }
        if !seen.insert((provider.app_type, provider.id.as_str())) {
            errors.push(ValidationError::new(
                format!("providers[{index}].id"),
                format!("duplicate provider '{}' for {}", provider.id, provider.app_type),
            ));
        }
        if !matches!(provider.base_url.scheme(), "http" | "https") {
            errors.push(ValidationError::new(
                format!("providers[{index}].base_url"),
                "scheme must be http or https",
            ));
        }
    }

    let known = |app: AppType, id: &str| seen.contains(&(app, id));

    for (name, id) in &config.current_provider {
        match name.parse::<AppType>() {
            Ok(app) if !known(app, id) => errors.push(ValidationError::new(
                format!("current_provider.{name}"),
                format!("unknown provider '{id}'"),
            )),
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::new(
                format!("current_provider.{name}"),
                "unknown app type",
            )),
        }
    }

    for (name, ids) in &config.failover {
        let Ok(app) = name.parse::<AppType>() else {
            errors.push(ValidationError::new(format!("failover.{name}"), "unknown app type"));
            continue;
        };
        let mut queued = HashSet::new();
        for id in ids {
            if !known(app, id) {
                errors.push(ValidationError::new(
                    format!("failover.{name}"),
                    format!("unknown provider '{id}'"),
                ));
            }
            if !queued.insert(id.as_str()) {
                errors.push(ValidationError::new(
                    format!("failover.{name}"),
                    format!("provider '{id}' listed twice"),
                ));
            }
        }
    }

    collect(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProviderConfig;

    #[test]
    fn test_max_retries_bounds() {
        let mut config = AppProxyConfig {
            max_retries: 10,
            ..Default::default()
        };
        assert!(validate_app_config(&config).is_ok());

        config.max_retries = 11;
        let errors = validate_app_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "maxRetries");
    }

    #[test]
    fn test_reports_every_violation() {
        let config = AppProxyConfig {
            max_retries: 11,
            streaming_first_byte_timeout: 181,
            streaming_idle_timeout: 601,
            non_streaming_timeout: 1801,
            circuit_failure_threshold: 0,
            circuit_success_threshold: 11,
            circuit_timeout_seconds: 301,
            circuit_error_rate_threshold: 1.5,
            circuit_min_requests: 4,
            ..Default::default()
        };
        let errors = validate_app_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "maxRetries",
                "streamingFirstByteTimeout",
                "streamingIdleTimeout",
                "nonStreamingTimeout",
                "circuitFailureThreshold",
                "circuitSuccessThreshold",
                "circuitTimeoutSeconds",
                "circuitErrorRateThreshold",
                "circuitMinRequests",
            ]
        );
    }

    #[test]
    fn test_zero_timeouts_are_unbounded_not_invalid() {
        let config = AppProxyConfig {
            streaming_first_byte_timeout: 0,
            streaming_idle_timeout: 0,
            non_streaming_timeout: 0,
            circuit_timeout_seconds: 0,
            ..Default::default()
        };
        assert!(validate_app_config(&config).is_ok());
    }

    #[test]
    fn test_nan_error_rate_rejected() {
        let breaker = CircuitBreakerConfig {
            error_rate_threshold: f64::NAN,
            ..Default::default()
        };
        let errors = validate_breaker_config(&breaker).unwrap_err();
        assert_eq!(errors[0].field, "errorRateThreshold");
    }

    #[test]
    fn test_referential_integrity() {
        let mut config = ProxyConfig::default();
        config.providers.push(ProviderConfig {
            id: "a".into(),
            app_type: AppType::Claude,
            name: None,
            base_url: "http://127.0.0.1:1".parse().unwrap(),
            api_key: None,
            headers: Default::default(),
        });
        config
            .failover
            .insert("claude".into(), vec!["a".into(), "missing".into(), "a".into()]);
        config.current_provider.insert("codex".into(), "a".into());
        config.apps.insert("cursor".into(), AppProxyConfig::default());

        let errors = validate_config(&config).unwrap_err();
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert!(messages.iter().any(|m| m.contains("unknown provider 'missing'")));
        assert!(messages.iter().any(|m| m.contains("listed twice")));
        assert!(messages.iter().any(|m| m.starts_with("current_provider.codex")));
        assert!(messages.iter().any(|m| m.starts_with("apps.cursor")));
    }
}
