//! In-process request statistics for the status endpoint.
//!
//! Prometheus covers long-term metrics; these counters back `getProxyStatus`
//! and are cleared whenever the proxy server starts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    active: AtomicU64,
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    failovers: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Shared request counters.
#[derive(Debug, Clone, Default)]
pub struct ProxyStats {
    inner: Arc<Counters>,
}

/// Point-in-time copy of [`ProxyStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub active_connections: u64,
    pub total_requests: u64,
    pub success_requests: u64,
    pub failed_requests: u64,
    /// Percentage of finished requests that succeeded.
    pub success_rate: f64,
    pub failover_count: u64,
    pub last_error: Option<String>,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request as in flight until the guard drops.
    pub fn track(&self) -> InFlightGuard {
        self.inner.total.fetch_add(1, Ordering::Relaxed);
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn record_success(&self) {
        self.inner.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
        *self
            .inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error.into());
    }

    pub fn record_failover(&self) {
        self.inner.failovers.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero the counters. In-flight requests keep their guard.
    pub fn reset(&self) {
        self.inner.total.store(0, Ordering::Relaxed);
        self.inner.success.store(0, Ordering::Relaxed);
        self.inner.failed.store(0, Ordering::Relaxed);
        self.inner.failovers.store(0, Ordering::Relaxed);
        *self
            .inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let success = self.inner.success.load(Ordering::Relaxed);
        let failed = self.inner.failed.load(Ordering::Relaxed);
        let finished = success + failed;
        StatsSnapshot {
            active_connections: self.inner.active.load(Ordering::SeqCst),
            total_requests: self.inner.total.load(Ordering::Relaxed),
            success_requests: success,
            failed_requests: failed,
            success_rate: if finished == 0 {
                0.0
            } else {
                success as f64 * 100.0 / finished as f64
            },
            failover_count: self.inner.failovers.load(Ordering::Relaxed),
            last_error: self
                .inner
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Decrements the active count when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    inner: Arc<Counters>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}
