//! Per-provider health record.
//!
//! Pure data plus the bookkeeping that every recorded outcome performs.
//! Breaker decisions over this record live in
//! [`crate::resilience::circuit_breaker`].

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppType;
use crate::resilience::circuit_breaker::CircuitState;

/// Rolling window of the most recent outcomes (`true` = success).
#[derive(Debug, Clone)]
pub struct OutcomeWindow {
    samples: VecDeque<bool>,
    capacity: usize,
}

impl OutcomeWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an outcome, dropping the oldest beyond capacity.
    pub fn push(&mut self, success: bool) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(success);
    }

    /// Change the capacity, keeping the newest samples.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn failures(&self) -> usize {
        self.samples.iter().filter(|ok| !**ok).count()
    }

    /// Failure fraction over the samples held, `0.0` when empty.
    pub fn failure_rate(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.failures() as f64 / self.samples.len() as f64
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Mutable health record for one (provider, app) pair.
#[derive(Debug, Clone)]
pub struct HealthEntry {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Successes counted while half-open.
    pub consecutive_successes: u32,
    pub window: OutcomeWindow,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Monotonic stamp of the last state change, drives the cool-down.
    pub last_state_change: Instant,
    pub last_state_change_at: DateTime<Utc>,
    /// Whether the half-open probe slot is claimed.
    pub probe_in_flight: bool,
    /// Bumped by manual resets; outcomes from older admissions are discarded.
    pub generation: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
}

impl HealthEntry {
    pub fn new(window_capacity: usize, now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            window: OutcomeWindow::new(window_capacity),
            last_failure_at: None,
            last_success_at: None,
            last_error: None,
            last_state_change: now,
            last_state_change_at: Utc::now(),
            probe_in_flight: false,
            generation: 0,
            total_requests: 0,
            failed_requests: 0,
        }
    }

    /// Counters, window and timestamps for one outcome. No state change.
    pub fn push_outcome(&mut self, success: bool, window_capacity: usize, error: Option<&str>) {
        if self.window.capacity() != window_capacity.max(1) {
            self.window.resize(window_capacity);
        }
        self.window.push(success);
        self.total_requests += 1;

        if success {
            self.consecutive_failures = 0;
            self.last_success_at = Some(Utc::now());
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.failed_requests += 1;
            self.last_failure_at = Some(Utc::now());
            self.last_error = error.map(str::to_string);
        }
    }

    pub fn set_state(&mut self, state: CircuitState, now: Instant) {
        self.state = state;
        self.last_state_change = now;
        self.last_state_change_at = Utc::now();
    }

    /// Manual reset: closed, counters and window cleared, probe claim cancelled.
    pub fn reset(&mut self, now: Instant) {
        self.set_state(CircuitState::Closed, now);
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.window.clear();
        self.probe_in_flight = false;
        self.last_error = None;
        self.generation += 1;
    }

    pub fn snapshot(&self, provider_id: &str, app_type: AppType) -> ProviderHealth {
        ProviderHealth {
            provider_id: provider_id.to_string(),
            app_type,
            state: self.state,
            is_healthy: self.state != CircuitState::Open,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            last_failure_at: self.last_failure_at,
            last_success_at: self.last_success_at,
            last_error: self.last_error.clone(),
            last_state_change_at: self.last_state_change_at,
            window_size: self.window.len(),
            window_failures: self.window.failures(),
            error_rate: self.window.failure_rate(),
            total_requests: self.total_requests,
            failed_requests: self.failed_requests,
            probe_in_flight: self.probe_in_flight,
        }
    }
}

/// Point-in-time health view returned by `getProviderHealth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider_id: String,
    pub app_type: AppType,
    pub state: CircuitState,
    pub is_healthy: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_state_change_at: DateTime<Utc>,
    pub window_size: usize,
    pub window_failures: usize,
    pub error_rate: f64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub probe_in_flight: bool,
}
