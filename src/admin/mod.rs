//! Admin API exposing the control plane over HTTP.
//!
//! Every route sits under `/admin` and requires `Authorization: Bearer <key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::control::ControlPlane;

#[derive(Clone)]
pub struct AdminState {
    pub control: Arc<ControlPlane>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(control: Arc<ControlPlane>, api_key: &str) -> Router {
    let state = AdminState {
        control,
        api_key: Arc::from(api_key),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/proxy/start", post(start_proxy))
        .route("/admin/proxy/stop", post(stop_proxy))
        .route("/admin/takeover", get(get_takeover))
        .route("/admin/takeover/health", get(get_takeover_health))
        .route("/admin/takeover/{app}", put(set_takeover))
        .route("/admin/circuit-breaker", get(get_breaker_config).put(update_breaker_config))
        .route("/admin/apps/{app}/provider", put(switch_provider))
        .route(
            "/admin/apps/{app}/queue",
            get(get_queue).post(add_to_queue).put(reorder_queue),
        )
        .route("/admin/apps/{app}/queue/{provider_id}", delete(remove_from_queue))
        .route(
            "/admin/apps/{app}/auto-failover",
            get(get_auto_failover).put(set_auto_failover),
        )
        .route("/admin/apps/{app}/config", get(get_app_config).put(update_app_config))
        .route("/admin/apps/{app}/providers/{provider_id}/health", get(get_provider_health))
        .route("/admin/apps/{app}/providers/{provider_id}/reset", post(reset_breaker))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
