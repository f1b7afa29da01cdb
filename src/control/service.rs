//! Control plane: every operation the host application or the admin API can
//! invoke on the proxy.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::validation::join_errors;
use crate::config::schema::UnknownAppType;
use crate::config::{AppProxyConfig, AppType, ProxyConfig, RuntimeSettings, ValidationError};
use crate::control::takeover::{LiveConfigRewriter, RewriteError, TakeoverController, TakeoverHealth};
use crate::failover::{FailoverQueueItem, FailoverQueues, QueueError};
use crate::health::{HealthStore, ProviderHealth, ProviderKey};
use crate::http::{ProxyServer, ProxyServerInfo};
use crate::observability::stats::{ProxyStats, StatsSnapshot};
use crate::provider::{ProviderCatalog, StaticCatalog};
use crate::resilience::CircuitBreakerConfig;
use crate::routing::RequestRouter;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    UnknownApp(#[from] UnknownAppType),

    #[error("unknown provider '{provider}' for {app}")]
    UnknownProvider { app: AppType, provider: String },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error("proxy server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

impl From<Vec<ValidationError>> for ControlError {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::Validation(errors)
    }
}

/// Provider an app is pinned to in single-target mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTarget {
    pub provider_id: String,
    pub provider_name: Option<String>,
}

/// Process-wide proxy status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStatus {
    pub running: bool,
    pub address: String,
    pub port: u16,
    pub uptime_seconds: u64,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    pub active_targets: BTreeMap<AppType, ActiveTarget>,
}

/// Facade over settings, queues, health, takeover and the server.
pub struct ControlPlane {
    settings: Arc<RuntimeSettings>,
    queues: Arc<FailoverQueues>,
    health: Arc<HealthStore>,
    catalog: Arc<StaticCatalog>,
    takeover: TakeoverController,
    server: ProxyServer,
}

impl ControlPlane {
    /// Build every subsystem from a validated config.
    pub fn from_config(
        config: &ProxyConfig,
        rewriter: Arc<dyn LiveConfigRewriter>,
    ) -> Result<Self, ControlError> {
        let settings = Arc::new(RuntimeSettings::from_config(config));
        let queues = Arc::new(FailoverQueues::new());
        for app in AppType::ALL {
            if let Some(ids) = config.failover.get(app.as_str()) {
                queues.seed(app, ids)?;
            }
        }
        let health = Arc::new(HealthStore::new());
        let catalog = Arc::new(StaticCatalog::new(config.providers.clone()));
        let stats = ProxyStats::new();

        let router = RequestRouter::new(
            &config.listener,
            settings.clone(),
            queues.clone(),
            health.clone(),
            catalog.clone(),
            stats.clone(),
        )?;
        let server = ProxyServer::new(config.listener.clone(), Arc::new(router), stats);

        Ok(Self {
            settings,
            queues,
            health,
            catalog,
            takeover: TakeoverController::new(rewriter),
            server,
        })
    }

    /// Swap in a reloaded config file.
    ///
    /// Queues and takeover flags are runtime state and stay as they are.
    pub fn apply_config(&self, config: &ProxyConfig) {
        self.catalog.replace(config.providers.clone());
        self.settings.reload(config);
        self.server.set_listener(config.listener.clone());
        tracing::info!("Configuration applied");
    }

    fn require_provider(&self, app: AppType, provider_id: &str) -> Result<(), ControlError> {
        match self.catalog.get(app, provider_id) {
            Some(_) => Ok(()),
            None => Err(ControlError::UnknownProvider {
                app,
                provider: provider_id.to_string(),
            }),
        }
    }

    fn named(&self, app: AppType, mut items: Vec<FailoverQueueItem>) -> Vec<FailoverQueueItem> {
        for item in &mut items {
            item.provider_name = self
                .catalog
                .get(app, &item.provider_id)
                .map(|p| p.name.clone());
        }
        items
    }

    async fn proxy_url(&self) -> String {
        match self.server.info().await {
            Some((info, _)) => format!("http://{}:{}", info.address, info.port),
            None => format!("http://{}", self.server.listener().bind_address()),
        }
    }

    // Server lifecycle

    pub async fn start_proxy_server(&self) -> Result<ProxyServerInfo, ControlError> {
        Ok(self.server.start().await?)
    }

    /// Restore every taken-over app, then stop the server.
    ///
    /// The server stops even when a restore fails; the first failure is
    /// reported afterwards.
    pub async fn stop_proxy_with_restore(&self) -> Result<(), ControlError> {
        let failures = self.takeover.disable_all();
        for (app, err) in &failures {
            tracing::error!(app = %app, error = %err, "Failed to restore live config");
        }
        if self.server.stop().await {
            tracing::info!("Proxy stopped with restore");
        }
        match failures.into_iter().next() {
            Some((_, err)) => Err(err.into()),
            None => Ok(()),
        }
    }

    pub async fn get_proxy_status(&self) -> ProxyStatus {
        let (running, address, port, uptime_seconds) = match self.server.info().await {
            Some((info, uptime)) => (true, info.address, info.port, uptime.as_secs()),
            None => (false, String::new(), 0, 0),
        };
        let active_targets = AppType::ALL
            .into_iter()
            .filter_map(|app| {
                let provider_id = self.settings.current_provider(app)?;
                let provider_name = self.catalog.get(app, &provider_id).map(|p| p.name.clone());
                Some((
                    app,
                    ActiveTarget {
                        provider_id,
                        provider_name,
                    },
                ))
            })
            .collect();

        ProxyStatus {
            running,
            address,
            port,
            uptime_seconds,
            stats: self.server.stats().snapshot(),
            active_targets,
        }
    }

    // Takeover

    pub fn get_proxy_takeover_status(&self) -> BTreeMap<AppType, bool> {
        self.takeover.status()
    }

    pub async fn set_proxy_takeover_for_app(
        &self,
        app: AppType,
        enabled: bool,
    ) -> Result<(), ControlError> {
        let proxy_url = self.proxy_url().await;
        self.takeover.set(app, enabled, &proxy_url)?;
        Ok(())
    }

    pub async fn get_takeover_health(&self) -> BTreeMap<AppType, TakeoverHealth> {
        self.takeover.health(self.server.is_running().await)
    }

    // Provider selection

    pub fn switch_proxy_provider(&self, app: AppType, provider_id: &str) -> Result<(), ControlError> {
        self.require_provider(app, provider_id)?;
        self.settings.set_current_provider(app, Some(provider_id.to_string()));
        tracing::info!(app = %app, provider = %provider_id, "Current provider switched");
        Ok(())
    }

    // Failover queue

    pub fn get_failover_queue(&self, app: AppType) -> Vec<FailoverQueueItem> {
        self.named(app, self.queues.list(app))
    }

    pub fn add_to_failover_queue(
        &self,
        app: AppType,
        provider_id: &str,
    ) -> Result<Vec<FailoverQueueItem>, ControlError> {
        self.require_provider(app, provider_id)?;
        let items = self.queues.add(app, provider_id)?;
        Ok(self.named(app, items))
    }

    /// Remove from the queue and forget the provider's health.
    pub fn remove_from_failover_queue(
        &self,
        app: AppType,
        provider_id: &str,
    ) -> Result<Vec<FailoverQueueItem>, ControlError> {
        let items = self.queues.remove(app, provider_id)?;
        self.health.reset(&ProviderKey::new(provider_id, app));
        Ok(self.named(app, items))
    }

    pub fn reorder_failover_queue(
        &self,
        app: AppType,
        provider_ids: &[String],
    ) -> Result<Vec<FailoverQueueItem>, ControlError> {
        let items = self.queues.reorder(app, provider_ids)?;
        Ok(self.named(app, items))
    }

    pub fn get_auto_failover_enabled(&self, app: AppType) -> bool {
        self.settings.proxy_config(app).auto_failover_enabled
    }

    pub fn set_auto_failover_enabled(&self, app: AppType, enabled: bool) -> bool {
        self.settings.set_auto_failover(app, enabled);
        tracing::info!(app = %app, enabled, "Auto failover updated");
        enabled
    }

    // Health

    pub fn get_provider_health(&self, provider_id: &str, app: AppType) -> ProviderHealth {
        self.health.snapshot(&ProviderKey::new(provider_id, app))
    }

    pub fn reset_circuit_breaker(&self, provider_id: &str, app: AppType) {
        self.health.reset(&ProviderKey::new(provider_id, app));
    }

    // Tunables

    pub fn get_circuit_breaker_config(&self) -> CircuitBreakerConfig {
        self.settings.breaker_template()
    }

    pub fn update_circuit_breaker_config(
        &self,
        config: CircuitBreakerConfig,
    ) -> Result<CircuitBreakerConfig, ControlError> {
        let applied = self.settings.update_breaker_template(config)?;
        tracing::info!(config = ?applied, "Circuit breaker config updated");
        Ok(applied)
    }

    pub fn get_proxy_config_for_app(&self, app: AppType) -> AppProxyConfig {
        self.settings.proxy_config(app)
    }

    pub fn update_proxy_config_for_app(
        &self,
        app: AppType,
        config: AppProxyConfig,
    ) -> Result<AppProxyConfig, ControlError> {
        let applied = self.settings.update_proxy_config(app, config)?;
        tracing::info!(app = %app, config = ?applied, "Proxy config updated");
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::control::takeover::DetachedRewriter;
    use crate::resilience::CircuitState;

    fn provider(id: &str, app_type: AppType) -> ProviderConfig {
        ProviderConfig {
            id: id.into(),
            app_type,
            name: Some(format!("{id} relay")),
            base_url: "http://127.0.0.1:9".parse().unwrap(),
            api_key: None,
            headers: Default::default(),
        }
    }

    fn control() -> ControlPlane {
        let mut config = ProxyConfig::default();
        config.listener.listen_port = 0;
        config.providers = vec![
            provider("a", AppType::Claude),
            provider("b", AppType::Claude),
            provider("c", AppType::Claude),
        ];
        config.failover.insert("claude".into(), vec!["a".into(), "b".into()]);
        ControlPlane::from_config(&config, Arc::new(DetachedRewriter)).unwrap()
    }

    #[test]
    fn test_queue_operations_resolve_names() {
        let control = control();
        let items = control.add_to_failover_queue(AppType::Claude, "c").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].priority, 3);
        assert_eq!(items[2].provider_name.as_deref(), Some("c relay"));

        assert!(matches!(
            control.add_to_failover_queue(AppType::Claude, "ghost"),
            Err(ControlError::UnknownProvider { .. })
        ));
        assert!(matches!(
            control.add_to_failover_queue(AppType::Claude, "a"),
            Err(ControlError::Queue(QueueError::Duplicate(_)))
        ));
    }

    #[test]
    fn test_remove_resets_health() {
        let control = control();
        let key = ProviderKey::new("a", AppType::Claude);
        let breaker = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        control.health.try_admit(&key, &breaker).unwrap().record_failure("502");
        assert_eq!(control.get_provider_health("a", AppType::Claude).state, CircuitState::Open);

        control.remove_from_failover_queue(AppType::Claude, "a").unwrap();
        let health = control.get_provider_health("a", AppType::Claude);
        assert_eq!(health.state, CircuitState::Closed);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[test]
    fn test_update_validation_lists_violations() {
        let control = control();
        let bad = AppProxyConfig {
            max_retries: 11,
            circuit_min_requests: 1,
            ..Default::default()
        };
        match control.update_proxy_config_for_app(AppType::Codex, bad) {
            Err(ControlError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(control.get_proxy_config_for_app(AppType::Codex).max_retries, 3);
    }

    #[test]
    fn test_switch_requires_known_provider() {
        let control = control();
        control.switch_proxy_provider(AppType::Claude, "b").unwrap();
        assert!(control.switch_proxy_provider(AppType::Codex, "b").is_err());
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let control = control();
        let first = control.start_proxy_server().await.unwrap();
        let second = control.start_proxy_server().await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first.port, 0);

        control.set_proxy_takeover_for_app(AppType::Claude, true).await.unwrap();
        assert_eq!(
            control.get_takeover_health().await[&AppType::Claude],
            TakeoverHealth::Healthy
        );

        control.stop_proxy_with_restore().await.unwrap();
        control.stop_proxy_with_restore().await.unwrap();
        let status = control.get_proxy_status().await;
        assert!(!status.running);
        assert!(!control.get_proxy_takeover_status()[&AppType::Claude]);
    }

    #[tokio::test]
    async fn test_takeover_while_stopped_is_broken() {
        let control = control();
        control.set_proxy_takeover_for_app(AppType::Gemini, true).await.unwrap();
        assert_eq!(
            control.get_takeover_health().await[&AppType::Gemini],
            TakeoverHealth::Broken
        );
    }
}
