//! Concurrent health store keyed by (provider, app).
//!
//! Entries live in a sharded map and each carries its own mutex, so outcome
//! recording is linearizable per provider while different providers never
//! contend on the same lock. Admission hands out an [`Admission`] guard that
//! owns the half-open probe slot until an outcome is recorded or the guard
//! is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use dashmap::DashMap;

use crate::config::AppType;
use crate::health::state::{HealthEntry, ProviderHealth};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{
    AdmitDecision, CircuitBreaker, CircuitBreakerConfig, CircuitState, Transition,
};

/// Identity of a health entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderKey {
    pub provider_id: String,
    pub app_type: AppType,
}

impl ProviderKey {
    pub fn new(provider_id: impl Into<String>, app_type: AppType) -> Self {
        Self {
            provider_id: provider_id.into(),
            app_type,
        }
    }
}

type SharedEntry = Arc<Mutex<HealthEntry>>;

fn lock(entry: &Mutex<HealthEntry>) -> MutexGuard<'_, HealthEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn report(key: &ProviderKey, transition: Transition) {
    match transition.to {
        CircuitState::Open => tracing::warn!(
            provider = %key.provider_id,
            app = %key.app_type,
            from = %transition.from,
            "Circuit opened"
        ),
        _ => tracing::info!(
            provider = %key.provider_id,
            app = %key.app_type,
            from = %transition.from,
            to = %transition.to,
            "Circuit state changed"
        ),
    }
    metrics::record_circuit_transition(key, transition);
}

/// Per-(provider, app) health records.
#[derive(Debug, Default)]
pub struct HealthStore {
    entries: DashMap<ProviderKey, SharedEntry>,
}

impl HealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &ProviderKey) -> Option<SharedEntry> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    fn entry(&self, key: &ProviderKey, config: &CircuitBreakerConfig) -> SharedEntry {
        if let Some(existing) = self.get(key) {
            return existing;
        }
        self.entries
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(HealthEntry::new(config.window_capacity(), Instant::now())))
            })
            .clone()
    }

    /// Ask the breaker for admission at `now`.
    pub fn try_admit_at(
        &self,
        key: &ProviderKey,
        config: &CircuitBreakerConfig,
        now: Instant,
    ) -> Option<Admission> {
        let shared = self.entry(key, config);
        let (decision, generation) = {
            let mut entry = lock(&shared);
            let (decision, transition) = CircuitBreaker::new(config).admit(&mut entry, now);
            if let Some(t) = transition {
                report(key, t);
            }
            (decision, entry.generation)
        };

        let probe = match decision {
            AdmitDecision::Reject => {
                tracing::debug!(provider = %key.provider_id, app = %key.app_type, "Breaker rejected candidate");
                return None;
            }
            AdmitDecision::Admit => false,
            AdmitDecision::Probe => true,
        };

        Some(Admission {
            key: key.clone(),
            entry: shared,
            config: *config,
            generation,
            probe,
            settled: false,
        })
    }

    pub fn try_admit(&self, key: &ProviderKey, config: &CircuitBreakerConfig) -> Option<Admission> {
        self.try_admit_at(key, config, Instant::now())
    }

    /// Health view; providers never seen report a fresh closed entry.
    pub fn snapshot(&self, key: &ProviderKey) -> ProviderHealth {
        match self.get(key) {
            Some(shared) => {
                let entry = lock(&shared);
                entry.snapshot(&key.provider_id, key.app_type)
            }
            None => HealthEntry::new(1, Instant::now()).snapshot(&key.provider_id, key.app_type),
        }
    }

    /// Current state without triggering the lazy Open → HalfOpen move.
    pub fn state(&self, key: &ProviderKey) -> CircuitState {
        match self.get(key) {
            Some(shared) => {
                let entry = lock(&shared);
                entry.state
            }
            None => CircuitState::Closed,
        }
    }

    /// Manual reset. Cancels any in-flight probe claim; its outcome is
    /// discarded when it arrives.
    pub fn reset(&self, key: &ProviderKey) {
        if let Some(shared) = self.get(key) {
            let mut entry = lock(&shared);
            let previous = entry.state;
            entry.reset(Instant::now());
            if previous != CircuitState::Closed {
                report(
                    key,
                    Transition {
                        from: previous,
                        to: CircuitState::Closed,
                    },
                );
            }
        }
        tracing::info!(provider = %key.provider_id, app = %key.app_type, "Circuit breaker reset");
    }
}

/// Permission to send one request to a provider.
///
/// Exactly one outcome may be recorded. Dropping the guard without recording
/// (client cancelled, upstream 4xx) counts nothing and frees the probe slot.
#[derive(Debug)]
pub struct Admission {
    key: ProviderKey,
    entry: SharedEntry,
    config: CircuitBreakerConfig,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl Admission {
    pub fn key(&self) -> &ProviderKey {
        &self.key
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(self) -> Option<Transition> {
        self.record_at(true, None, Instant::now())
    }

    pub fn record_failure(self, error: &str) -> Option<Transition> {
        self.record_at(false, Some(error), Instant::now())
    }

    /// Record an outcome at `now`.
    pub fn record_at(mut self, success: bool, error: Option<&str>, now: Instant) -> Option<Transition> {
        self.settled = true;
        let mut entry = lock(&self.entry);
        if entry.generation != self.generation {
            tracing::debug!(provider = %self.key.provider_id, "Discarding outcome from before a reset");
            return None;
        }
        let transition =
            CircuitBreaker::new(&self.config).record(&mut entry, success, self.probe, error, now);
        drop(entry);
        if let Some(t) = transition {
            report(&self.key, t);
        }
        transition
    }

    /// Give the admission back without counting an outcome.
    pub fn release(self) {}
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.settled || !self.probe {
            return;
        }
        let mut entry = lock(&self.entry);
        if entry.generation == self.generation && entry.state == CircuitState::HalfOpen {
            entry.probe_in_flight = false;
        }
    }
}
