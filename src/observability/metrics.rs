//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, failovers, breaker state)
//! - Expose a Prometheus-compatible scrape endpoint
//! - Label per app and per provider
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by app, status, provider
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_upstream_failures_total` (counter): failed attempts by kind
//! - `proxy_failovers_total` (counter): moves to a later queue candidate
//! - `proxy_circuit_transitions_total` (counter): breaker transitions
//! - `proxy_circuit_state` (gauge): 0=closed, 1=half_open, 2=open
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::config::AppType;
use crate::health::ProviderKey;
use crate::resilience::circuit_breaker::Transition;

/// Install the global recorder and start the scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// One finished client request.
pub fn record_request(app: AppType, status: u16, provider: &str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "app" => app.as_str(),
        "status" => status.to_string(),
        "provider" => provider.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "app" => app.as_str())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_failure(app: AppType, provider: &str, kind: &'static str) {
    counter!(
        "proxy_upstream_failures_total",
        "app" => app.as_str(),
        "provider" => provider.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_failover(app: AppType) {
    counter!("proxy_failovers_total", "app" => app.as_str()).increment(1);
}

pub fn record_circuit_transition(key: &ProviderKey, transition: Transition) {
    counter!(
        "proxy_circuit_transitions_total",
        "app" => key.app_type.as_str(),
        "provider" => key.provider_id.clone(),
        "to" => transition.to.to_string()
    )
    .increment(1);
    gauge!(
        "proxy_circuit_state",
        "app" => key.app_type.as_str(),
        "provider" => key.provider_id.clone()
    )
    .set(transition.to.as_gauge());
}
