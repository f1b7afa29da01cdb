//! Proxy HTTP server.
//!
//! # Responsibilities
//! - Bind `listen_address:listen_port` and serve until stopped
//! - Wire up middleware (request ID, tracing, body limit)
//! - Resolve the app, buffer the body and hand off to the router
//! - Start and stop idempotently, reporting the bound address
//!
//! # Design Decisions
//! - The axum router is rebuilt on every start so listener settings from a
//!   reloaded config apply on the next start
//! - Stop drains in-flight requests for a bounded time, then aborts

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, Request, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ListenerConfig;
use crate::error::ProxyError;
use crate::http::request::{is_streaming, request_id, UuidRequestId};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::observability::stats::ProxyStats;
use crate::routing::{AppResolver, ProxyRequest, RequestRouter};

/// How long `stop` waits for in-flight requests before aborting them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a started server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyServerInfo {
    pub address: String,
    pub port: u16,
    pub started_at: DateTime<Utc>,
}

/// State injected into the proxy handler.
#[derive(Clone)]
struct ProxyState {
    router: Arc<RequestRouter>,
    resolver: Arc<AppResolver>,
    stats: ProxyStats,
}

struct RunningServer {
    info: ProxyServerInfo,
    started: Instant,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

/// Start/stop handle around the proxy listener.
pub struct ProxyServer {
    listener: ArcSwap<ListenerConfig>,
    router: Arc<RequestRouter>,
    resolver: Arc<AppResolver>,
    stats: ProxyStats,
    running: Mutex<Option<RunningServer>>,
}

impl ProxyServer {
    pub fn new(listener: ListenerConfig, router: Arc<RequestRouter>, stats: ProxyStats) -> Self {
        Self {
            listener: ArcSwap::from_pointee(listener),
            router,
            resolver: Arc::new(AppResolver::default()),
            stats,
            running: Mutex::new(None),
        }
    }

    /// Listener settings used by the next start.
    pub fn set_listener(&self, listener: ListenerConfig) {
        self.listener.store(Arc::new(listener));
    }

    pub fn listener(&self) -> ListenerConfig {
        ListenerConfig::clone(&self.listener.load())
    }

    pub fn stats(&self) -> &ProxyStats {
        &self.stats
    }

    /// Build the axum router with all middleware layers.
    fn build_router(&self, max_body_size: usize) -> Router {
        let state = ProxyState {
            router: self.router.clone(),
            resolver: self.resolver.clone(),
            stats: self.stats.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(DefaultBodyLimit::max(max_body_size))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "proxy_request",
                            request_id = %request_id(request.headers()),
                            method = %request.method(),
                            uri = %request.uri(),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Start serving. Returns the existing info when already running.
    pub async fn start(&self) -> Result<ProxyServerInfo, std::io::Error> {
        let mut running = self.running.lock().await;
        if let Some(server) = running.as_ref() {
            if !server.task.is_finished() {
                return Ok(server.info.clone());
            }
            tracing::warn!("Proxy server task exited unexpectedly; restarting");
        }

        let config = self.listener();
        let listener = TcpListener::bind(config.bind_address()).await?;
        let local_addr: SocketAddr = listener.local_addr()?;
        let info = ProxyServerInfo {
            address: local_addr.ip().to_string(),
            port: local_addr.port(),
            started_at: Utc::now(),
        };

        self.stats.reset();
        let shutdown = Shutdown::new();
        let app = self.build_router(config.max_body_size);
        let signalled = shutdown.signalled();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signalled)
                .await
            {
                tracing::error!(error = %e, "Proxy server failed");
            }
            tracing::info!("Proxy server stopped");
        });

        tracing::info!(address = %local_addr, "Proxy server listening");
        *running = Some(RunningServer {
            info: info.clone(),
            started: Instant::now(),
            shutdown,
            task,
        });
        Ok(info)
    }

    /// Stop serving. Returns whether a server was running.
    pub async fn stop(&self) -> bool {
        let Some(server) = self.running.lock().await.take() else {
            return false;
        };

        server.shutdown.trigger();
        let mut task = server.task;
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
            tracing::warn!(timeout = ?DRAIN_TIMEOUT, "Drain timed out; aborting in-flight requests");
            task.abort();
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|server| !server.task.is_finished())
    }

    /// Info and uptime of the running server.
    pub async fn info(&self) -> Option<(ProxyServerInfo, Duration)> {
        self.running
            .lock()
            .await
            .as_ref()
            .filter(|server| !server.task.is_finished())
            .map(|server| (server.info.clone(), server.started.elapsed()))
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Resolve the app, then let the router forward the request.
async fn proxy_handler(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let _in_flight = state.stats.track();
    let request_id = request_id(&headers);

    let Some(matched) = state.resolver.resolve(&headers, &uri) else {
        tracing::warn!(request_id = %request_id, path = %uri.path(), "No app matched");
        let err = ProxyError::UnknownApp(uri.path().to_string());
        state.stats.record_failure(err.to_string());
        return err.into_response();
    };
    let app = matched.app_type;

    let request = ProxyRequest {
        request_id: request_id.clone(),
        app_type: app,
        method,
        forward_path: matched.forward_path,
        streaming: is_streaming(&uri, &body),
        headers,
        body,
    };

    match state.router.dispatch(request).await {
        Ok(routed) => {
            let status = routed.status;
            if status.is_client_error() || status.is_server_error() {
                state.stats.record_failure(format!("upstream returned {status}"));
            } else {
                state.stats.record_success();
            }
            metrics::record_request(app, status.as_u16(), &routed.provider_id, start);
            tracing::debug!(
                request_id = %request_id,
                app = %app,
                provider = %routed.provider_id,
                attempts = routed.attempts,
                status = %status,
                "Request routed"
            );
            routed.into_response()
        }
        Err(err) => {
            tracing::warn!(request_id = %request_id, app = %app, error = %err, "Request failed");
            state.stats.record_failure(err.to_string());
            metrics::record_request(app, err.status().as_u16(), "none", start);
            err.into_response()
        }
    }
}
