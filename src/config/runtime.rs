//! Live, hot-swappable settings shared by the router and the control plane.
//!
//! Readers take a cheap snapshot per request; writers publish a new table
//! through `ArcSwap::rcu`, so a config update never blocks in-flight traffic
//! and only applies to requests that start after it.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::{AppProxyConfig, AppType, ProxyConfig};
use crate::config::validation::{validate_app_config, validate_breaker_config, ValidationError};
use crate::resilience::circuit_breaker::CircuitBreakerConfig;

/// Settings of a single app.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppSettings {
    pub proxy: AppProxyConfig,
    /// Target of single-target (non-failover) mode.
    pub current_provider: Option<String>,
    /// Tunables were edited at runtime; reloads keep them.
    pub runtime_override: bool,
}

type AppTable = HashMap<AppType, AppSettings>;

/// Read-mostly per-app settings plus the global breaker template.
#[derive(Debug)]
pub struct RuntimeSettings {
    apps: ArcSwap<AppTable>,
    breaker_template: ArcSwap<CircuitBreakerConfig>,
}

impl RuntimeSettings {
    /// Build from a validated configuration.
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            apps: ArcSwap::from_pointee(Self::table_from(config)),
            breaker_template: ArcSwap::from_pointee(config.circuit_breaker),
        }
    }

    fn table_from(config: &ProxyConfig) -> AppTable {
        AppType::ALL
            .into_iter()
            .map(|app| {
                let proxy = config
                    .apps
                    .get(app.as_str())
                    .copied()
                    .unwrap_or_else(|| {
                        let mut proxy = AppProxyConfig::default();
                        proxy.set_breaker(&config.circuit_breaker);
                        proxy
                    });
                let current_provider = config.current_provider.get(app.as_str()).cloned();
                (
                    app,
                    AppSettings {
                        proxy,
                        current_provider,
                        runtime_override: false,
                    },
                )
            })
            .collect()
    }

    /// Snapshot of one app's settings.
    pub fn app(&self, app: AppType) -> AppSettings {
        self.apps.load().get(&app).cloned().unwrap_or_default()
    }

    /// Snapshot of one app's proxy tunables.
    pub fn proxy_config(&self, app: AppType) -> AppProxyConfig {
        self.app(app).proxy
    }

    pub fn current_provider(&self, app: AppType) -> Option<String> {
        self.app(app).current_provider
    }

    fn modify(&self, app: AppType, f: impl Fn(&mut AppSettings)) {
        self.apps.rcu(|table| {
            let mut next = AppTable::clone(table);
            f(next.entry(app).or_default());
            next
        });
    }

    /// Replace an app's tunables after validating every field.
    pub fn update_proxy_config(
        &self,
        app: AppType,
        config: AppProxyConfig,
    ) -> Result<AppProxyConfig, Vec<ValidationError>> {
        validate_app_config(&config)?;
        self.modify(app, |settings| {
            settings.proxy = config;
            settings.runtime_override = true;
        });
        Ok(config)
    }

    pub fn set_auto_failover(&self, app: AppType, enabled: bool) {
        self.modify(app, |settings| {
            settings.proxy.auto_failover_enabled = enabled;
            settings.runtime_override = true;
        });
    }

    pub fn set_current_provider(&self, app: AppType, provider_id: Option<String>) {
        self.modify(app, |settings| settings.current_provider = provider_id.clone());
    }

    /// The global breaker template.
    pub fn breaker_template(&self) -> CircuitBreakerConfig {
        **self.breaker_template.load()
    }

    /// Replace the global template and push it into every app.
    pub fn update_breaker_template(
        &self,
        breaker: CircuitBreakerConfig,
    ) -> Result<CircuitBreakerConfig, Vec<ValidationError>> {
        validate_breaker_config(&breaker)?;
        self.breaker_template.store(Arc::new(breaker));
        self.apps.rcu(|table| {
            let mut next = AppTable::clone(table);
            for settings in next.values_mut() {
                settings.proxy.set_breaker(&breaker);
            }
            next
        });
        Ok(breaker)
    }

    /// Apply a reloaded configuration file.
    ///
    /// Tunables come from the file unless they were edited at runtime
    /// through `update_proxy_config` or `set_auto_failover`. A current
    /// provider chosen at runtime is kept unless the file names one.
    pub fn reload(&self, config: &ProxyConfig) {
        let fresh = Self::table_from(config);
        self.apps.rcu(|table| {
            let mut next = fresh.clone();
            for (app, settings) in next.iter_mut() {
                let Some(old) = table.get(app) else { continue };
                if old.runtime_override {
                    settings.proxy = old.proxy;
                    settings.runtime_override = true;
                }
                if settings.current_provider.is_none() {
                    settings.current_provider = old.current_provider.clone();
                }
            }
            next
        });
        self.breaker_template.store(Arc::new(config.circuit_breaker));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_breaker_template() {
        let mut config = ProxyConfig::default();
        config.circuit_breaker.failure_threshold = 9;
        let settings = RuntimeSettings::from_config(&config);
        assert_eq!(settings.proxy_config(AppType::Gemini).circuit_failure_threshold, 9);
    }

    #[test]
    fn test_update_rejects_out_of_range() {
        let settings = RuntimeSettings::from_config(&ProxyConfig::default());
        let bad = AppProxyConfig {
            max_retries: 11,
            ..Default::default()
        };
        assert!(settings.update_proxy_config(AppType::Claude, bad).is_err());
        assert_eq!(settings.proxy_config(AppType::Claude).max_retries, 3);

        let good = AppProxyConfig {
            max_retries: 10,
            ..Default::default()
        };
        assert!(settings.update_proxy_config(AppType::Claude, good).is_ok());
        assert_eq!(settings.proxy_config(AppType::Claude).max_retries, 10);
    }

    #[test]
    fn test_breaker_template_applies_to_all_apps() {
        let settings = RuntimeSettings::from_config(&ProxyConfig::default());
        let breaker = CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        };
        settings.update_breaker_template(breaker).unwrap();
        for app in AppType::ALL {
            assert_eq!(settings.proxy_config(app).circuit_failure_threshold, 2);
        }
    }

    #[test]
    fn test_reload_keeps_runtime_current_provider() {
        let settings = RuntimeSettings::from_config(&ProxyConfig::default());
        settings.set_current_provider(AppType::Codex, Some("relay".into()));

        let mut config = ProxyConfig::default();
        config.apps.insert(
            "codex".into(),
            AppProxyConfig {
                max_retries: 1,
                ..Default::default()
            },
        );
        settings.reload(&config);

        let codex = settings.app(AppType::Codex);
        assert_eq!(codex.proxy.max_retries, 1);
        assert_eq!(codex.current_provider.as_deref(), Some("relay"));
    }

    #[test]
    fn test_reload_keeps_runtime_tunables() {
        let settings = RuntimeSettings::from_config(&ProxyConfig::default());
        settings.set_auto_failover(AppType::Claude, true);
        settings
            .update_proxy_config(
                AppType::Gemini,
                AppProxyConfig {
                    max_retries: 7,
                    ..Default::default()
                },
            )
            .unwrap();

        let mut config = ProxyConfig::default();
        for app in ["claude", "gemini", "codex"] {
            config.apps.insert(
                app.into(),
                AppProxyConfig {
                    max_retries: 1,
                    ..Default::default()
                },
            );
        }
        settings.reload(&config);

        let claude = settings.proxy_config(AppType::Claude);
        assert!(claude.auto_failover_enabled);
        assert_eq!(claude.max_retries, 3);
        assert_eq!(settings.proxy_config(AppType::Gemini).max_retries, 7);
        assert_eq!(settings.proxy_config(AppType::Codex).max_retries, 1);
        assert!(settings.app(AppType::Gemini).runtime_override);
    }
}
