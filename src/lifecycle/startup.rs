//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging, metrics and the control plane in order
//! - Start the config watcher and the admin API
//! - Optionally auto-start the proxy
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - On shutdown the proxy is stopped with takeover restore

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::admin::setup_admin_router;
use crate::config::loader::{load_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::watcher::ConfigWatcher;
use crate::config::ProxyConfig;
use crate::control::{ControlError, ControlPlane, DetachedRewriter};
use crate::lifecycle::signals::spawn_signal_listener;
use crate::lifecycle::Shutdown;
use crate::observability::{logging, metrics};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("config watcher failed: {0}")]
    Watcher(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the config file, or validate the defaults when none is given.
pub fn resolve_config(path: Option<&PathBuf>) -> Result<ProxyConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = ProxyConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

/// Run until a termination signal arrives.
pub async fn run(config_path: Option<PathBuf>) -> Result<(), StartupError> {
    let config = resolve_config(config_path.as_ref())?;
    logging::init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "failover-proxy starting");
    tracing::info!(
        listen = %config.listener.bind_address(),
        providers = config.providers.len(),
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let control = Arc::new(ControlPlane::from_config(&config, Arc::new(DetachedRewriter))?);
    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    // Keep the watcher handle alive for the life of the process.
    let _watcher = match config_path {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(&path);
            let handle = watcher.run()?;
            let control = control.clone();
            tokio::spawn(async move {
                while let Some(next) = updates.recv().await {
                    control.apply_config(&next);
                }
            });
            Some(handle)
        }
        None => None,
    };

    if config.listener.auto_start {
        let info = control.start_proxy_server().await?;
        tracing::info!(address = %info.address, port = info.port, "Proxy auto-started");
    }

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let app = setup_admin_router(control.clone(), &config.admin.api_key);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;
    } else {
        shutdown.signalled().await;
    }

    if let Err(e) = control.stop_proxy_with_restore().await {
        tracing::error!(error = %e, "Shutdown finished with errors");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
