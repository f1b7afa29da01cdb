//! Admin API handlers, one per control-plane operation.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::admin::AdminState;
use crate::config::{AppProxyConfig, AppType};
use crate::control::{ControlError, ProxyStatus, TakeoverHealth};
use crate::failover::{FailoverQueueItem, QueueError};
use crate::health::ProviderHealth;
use crate::http::ProxyServerInfo;
use crate::resilience::CircuitBreakerConfig;

type ApiResult<T> = Result<Json<T>, ControlError>;

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlError::Validation(_) => StatusCode::BAD_REQUEST,
            ControlError::UnknownApp(_) | ControlError::UnknownProvider { .. } => StatusCode::NOT_FOUND,
            ControlError::Queue(QueueError::Duplicate(_)) => StatusCode::CONFLICT,
            ControlError::Queue(QueueError::NotQueued(_)) => StatusCode::NOT_FOUND,
            ControlError::Queue(QueueError::InvalidOrdering(_)) => StatusCode::BAD_REQUEST,
            ControlError::Rewrite(_) | ControlError::Server(_) | ControlError::Client(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let mut body = json!({ "error": self.to_string() });
        if let ControlError::Validation(errors) = &self {
            body["violations"] = json!(errors);
        }
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EnabledBody {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderBody {
    pub provider_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderingBody {
    pub provider_ids: Vec<String>,
}

fn app(name: &str) -> Result<AppType, ControlError> {
    Ok(name.parse()?)
}

pub async fn get_status(State(state): State<AdminState>) -> Json<ProxyStatus> {
    Json(state.control.get_proxy_status().await)
}

pub async fn start_proxy(State(state): State<AdminState>) -> ApiResult<ProxyServerInfo> {
    Ok(Json(state.control.start_proxy_server().await?))
}

pub async fn stop_proxy(State(state): State<AdminState>) -> Result<StatusCode, ControlError> {
    state.control.stop_proxy_with_restore().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_takeover(State(state): State<AdminState>) -> Json<BTreeMap<AppType, bool>> {
    Json(state.control.get_proxy_takeover_status())
}

pub async fn get_takeover_health(
    State(state): State<AdminState>,
) -> Json<BTreeMap<AppType, TakeoverHealth>> {
    Json(state.control.get_takeover_health().await)
}

pub async fn set_takeover(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(body): Json<EnabledBody>,
) -> ApiResult<BTreeMap<AppType, bool>> {
    state
        .control
        .set_proxy_takeover_for_app(app(&name)?, body.enabled)
        .await?;
    Ok(Json(state.control.get_proxy_takeover_status()))
}

pub async fn switch_provider(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(body): Json<ProviderBody>,
) -> Result<StatusCode, ControlError> {
    state.control.switch_proxy_provider(app(&name)?, &body.provider_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_queue(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<FailoverQueueItem>> {
    Ok(Json(state.control.get_failover_queue(app(&name)?)))
}

pub async fn add_to_queue(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(body): Json<ProviderBody>,
) -> ApiResult<Vec<FailoverQueueItem>> {
    Ok(Json(state.control.add_to_failover_queue(app(&name)?, &body.provider_id)?))
}

pub async fn remove_from_queue(
    State(state): State<AdminState>,
    Path((name, provider_id)): Path<(String, String)>,
) -> ApiResult<Vec<FailoverQueueItem>> {
    Ok(Json(state.control.remove_from_failover_queue(app(&name)?, &provider_id)?))
}

pub async fn reorder_queue(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(body): Json<OrderingBody>,
) -> ApiResult<Vec<FailoverQueueItem>> {
    Ok(Json(state.control.reorder_failover_queue(app(&name)?, &body.provider_ids)?))
}

pub async fn get_auto_failover(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> ApiResult<EnabledBody> {
    Ok(Json(EnabledBody {
        enabled: state.control.get_auto_failover_enabled(app(&name)?),
    }))
}

pub async fn set_auto_failover(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(body): Json<EnabledBody>,
) -> ApiResult<EnabledBody> {
    Ok(Json(EnabledBody {
        enabled: state.control.set_auto_failover_enabled(app(&name)?, body.enabled),
    }))
}

pub async fn get_app_config(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> ApiResult<AppProxyConfig> {
    Ok(Json(state.control.get_proxy_config_for_app(app(&name)?)))
}

pub async fn update_app_config(
    State(state): State<AdminState>,
    Path(name): Path<String>,
    Json(config): Json<AppProxyConfig>,
) -> ApiResult<AppProxyConfig> {
    Ok(Json(state.control.update_proxy_config_for_app(app(&name)?, config)?))
}

pub async fn get_provider_health(
    State(state): State<AdminState>,
    Path((name, provider_id)): Path<(String, String)>,
) -> ApiResult<ProviderHealth> {
    Ok(Json(state.control.get_provider_health(&provider_id, app(&name)?)))
}

pub async fn reset_breaker(
    State(state): State<AdminState>,
    Path((name, provider_id)): Path<(String, String)>,
) -> ApiResult<ProviderHealth> {
    let app = app(&name)?;
    state.control.reset_circuit_breaker(&provider_id, app);
    Ok(Json(state.control.get_provider_health(&provider_id, app)))
}

pub async fn get_breaker_config(State(state): State<AdminState>) -> Json<CircuitBreakerConfig> {
    Json(state.control.get_circuit_breaker_config())
}

pub async fn update_breaker_config(
    State(state): State<AdminState>,
    Json(config): Json<CircuitBreakerConfig>,
) -> ApiResult<CircuitBreakerConfig> {
    Ok(Json(state.control.update_circuit_breaker_config(config)?))
}
