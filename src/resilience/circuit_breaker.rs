//! Circuit breaker for provider protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: provider excluded from routing
//! - Half-Open: one probe request at a time tests recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold,
//!                or full window with failure rate >= error rate threshold
//! Open → Half-Open: cool-down elapsed, evaluated lazily on admission
//! Half-Open → Closed: success_threshold consecutive probe successes
//! Half-Open → Open: any probe failure (restarts the cool-down)
//! ```
//!
//! The breaker owns no state of its own: it is a set of decisions evaluated
//! against a [`HealthEntry`] under that entry's lock.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::health::state::HealthEntry;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

impl CircuitState {
    /// Gauge value for metrics (0 closed, 1 half-open, 2 open).
    pub fn as_gauge(&self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::HalfOpen => 1.0,
            Self::Open => 2.0,
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,
    /// Cool-down in the open state before a probe is allowed.
    pub timeout_seconds: u64,
    /// Failure fraction over a full window that opens the circuit.
    pub error_rate_threshold: f64,
    /// Window size; the error rate is only judged on a full window.
    pub min_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_seconds: 60,
            error_rate_threshold: 0.5,
            min_requests: 10,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn window_capacity(&self) -> usize {
        self.min_requests.max(1) as usize
    }
}

/// A state change, reported for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Outcome of asking the breaker for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    /// Closed: regular request.
    Admit,
    /// Half-open: this request holds the single probe slot.
    Probe,
    /// Open and cooling down, or a probe is already in flight.
    Reject,
}

/// Whether the open-state cool-down is over.
pub fn cooldown_elapsed(now: Instant, last_state_change: Instant, timeout_seconds: u64) -> bool {
    now.saturating_duration_since(last_state_change) >= Duration::from_secs(timeout_seconds)
}

/// Breaker decisions for one config.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreaker<'a> {
    config: &'a CircuitBreakerConfig,
}

impl<'a> CircuitBreaker<'a> {
    pub fn new(config: &'a CircuitBreakerConfig) -> Self {
        Self { config }
    }

    /// Decide whether a request may go to this provider, claiming the probe
    /// slot when half-open. May move Open → HalfOpen.
    pub fn admit(&self, entry: &mut HealthEntry, now: Instant) -> (AdmitDecision, Option<Transition>) {
        match entry.state {
            CircuitState::Closed => (AdmitDecision::Admit, None),
            CircuitState::Open => {
                if !cooldown_elapsed(now, entry.last_state_change, self.config.timeout_seconds) {
                    return (AdmitDecision::Reject, None);
                }
                entry.set_state(CircuitState::HalfOpen, now);
                entry.consecutive_successes = 0;
                entry.probe_in_flight = true;
                (
                    AdmitDecision::Probe,
                    Some(Transition {
                        from: CircuitState::Open,
                        to: CircuitState::HalfOpen,
                    }),
                )
            }
            CircuitState::HalfOpen => {
                if entry.probe_in_flight {
                    (AdmitDecision::Reject, None)
                } else {
                    entry.probe_in_flight = true;
                    (AdmitDecision::Probe, None)
                }
            }
        }
    }

    /// Record an outcome and re-evaluate the state.
    ///
    /// Only the probe drives half-open transitions; outcomes of requests
    /// admitted before the circuit opened update the counters but never
    /// move the state.
    pub fn record(
        &self,
        entry: &mut HealthEntry,
        success: bool,
        is_probe: bool,
        error: Option<&str>,
        now: Instant,
    ) -> Option<Transition> {
        entry.push_outcome(success, self.config.window_capacity(), error);

        match entry.state {
            CircuitState::Closed => {
                let tripped = (!success && entry.consecutive_failures >= self.config.failure_threshold)
                    || self.error_rate_exceeded(entry);
                if tripped {
                    entry.set_state(CircuitState::Open, now);
                    entry.consecutive_successes = 0;
                    return Some(Transition {
                        from: CircuitState::Closed,
                        to: CircuitState::Open,
                    });
                }
                None
            }
            CircuitState::HalfOpen if is_probe => {
                entry.probe_in_flight = false;
                if success {
                    entry.consecutive_successes += 1;
                    if entry.consecutive_successes >= self.config.success_threshold {
                        entry.set_state(CircuitState::Closed, now);
                        entry.consecutive_successes = 0;
                        entry.consecutive_failures = 0;
                        entry.window.clear();
                        return Some(Transition {
                            from: CircuitState::HalfOpen,
                            to: CircuitState::Closed,
                        });
                    }
                    None
                } else {
                    entry.set_state(CircuitState::Open, now);
                    entry.consecutive_successes = 0;
                    Some(Transition {
                        from: CircuitState::HalfOpen,
                        to: CircuitState::Open,
                    })
                }
            }
            CircuitState::HalfOpen | CircuitState::Open => None,
        }
    }

    /// Judged on a full window only, whichever outcome filled it.
    fn error_rate_exceeded(&self, entry: &HealthEntry) -> bool {
        let window = &entry.window;
        window.len() >= self.config.window_capacity()
            && window.failures() > 0
            && window.failure_rate() >= self.config.error_rate_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout_seconds: 30,
            error_rate_threshold: 0.5,
            min_requests: 10,
        }
    }

    fn open_entry(cb: &CircuitBreaker<'_>, now: Instant) -> HealthEntry {
        let mut entry = HealthEntry::new(10, now);
        for _ in 0..3 {
            cb.record(&mut entry, false, false, Some("503"), now);
        }
        assert_eq!(entry.state, CircuitState::Open);
        entry
    }

    #[test]
    fn test_consecutive_failures_open_circuit() {
        let cfg = config();
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();

        for n in 1..=6u32 {
            let mut entry = HealthEntry::new(10, now);
            let mut transitions = Vec::new();
            for _ in 0..n {
                transitions.extend(cb.record(&mut entry, false, false, None, now));
            }
            if n >= cfg.failure_threshold {
                assert_eq!(entry.state, CircuitState::Open, "{n} failures");
                assert_eq!(
                    transitions,
                    vec![Transition {
                        from: CircuitState::Closed,
                        to: CircuitState::Open
                    }]
                );
            } else {
                assert_eq!(entry.state, CircuitState::Closed, "{n} failures");
            }
        }
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cfg = config();
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();
        let mut entry = HealthEntry::new(10, now);

        cb.record(&mut entry, false, false, None, now);
        cb.record(&mut entry, false, false, None, now);
        cb.record(&mut entry, true, false, None, now);
        cb.record(&mut entry, false, false, None, now);
        assert_eq!(entry.consecutive_failures, 1);
        assert_eq!(entry.state, CircuitState::Closed);
    }

    #[test]
    fn test_error_rate_opens_on_half_failures() {
        // failure_threshold high enough that only the error rate can trip.
        let cfg = CircuitBreakerConfig {
            failure_threshold: 20,
            ..config()
        };
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();

        let mut entry = HealthEntry::new(10, now);
        let pattern = [false, true, false, true, true, false, true, false, true, false];
        for ok in pattern {
            cb.record(&mut entry, ok, false, None, now);
        }
        assert_eq!(entry.window.failures(), 5);
        assert_eq!(entry.state, CircuitState::Open);
    }

    #[test]
    fn test_error_rate_opens_when_success_fills_window() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 20,
            ..config()
        };
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();

        let mut entry = HealthEntry::new(10, now);
        let pattern = [false, false, false, false, false, true, true, true, true];
        for ok in pattern {
            assert!(cb.record(&mut entry, ok, false, None, now).is_none());
        }
        assert_eq!(entry.state, CircuitState::Closed);

        let transition = cb.record(&mut entry, true, false, None, now);
        assert_eq!(
            transition,
            Some(Transition {
                from: CircuitState::Closed,
                to: CircuitState::Open
            })
        );
        assert_eq!(entry.window.failures(), 5);
    }

    #[test]
    fn test_error_rate_below_threshold_stays_closed() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 20,
            ..config()
        };
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();

        let mut entry = HealthEntry::new(10, now);
        let pattern = [false, true, true, false, true, false, true, true, false, true];
        for ok in pattern {
            cb.record(&mut entry, ok, false, None, now);
        }
        assert_eq!(entry.window.failures(), 4);
        assert_eq!(entry.state, CircuitState::Closed);
    }

    #[test]
    fn test_error_rate_needs_full_window() {
        let cfg = CircuitBreakerConfig {
            failure_threshold: 20,
            ..config()
        };
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();

        let mut entry = HealthEntry::new(10, now);
        for ok in [false, true, false, true, false] {
            cb.record(&mut entry, ok, false, None, now);
        }
        assert_eq!(entry.state, CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_until_cooldown() {
        let cfg = config();
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();
        let mut entry = open_entry(&cb, now);

        let (decision, transition) = cb.admit(&mut entry, now + Duration::from_secs(29));
        assert_eq!(decision, AdmitDecision::Reject);
        assert!(transition.is_none());
        assert_eq!(entry.state, CircuitState::Open);
    }

    #[test]
    fn test_recovery_path_closes_after_success_threshold() {
        let cfg = config();
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();
        let mut entry = open_entry(&cb, now);

        let t1 = now + Duration::from_secs(30);
        let (decision, transition) = cb.admit(&mut entry, t1);
        assert_eq!(decision, AdmitDecision::Probe);
        assert_eq!(
            transition,
            Some(Transition {
                from: CircuitState::Open,
                to: CircuitState::HalfOpen
            })
        );

        // Single-flight: a second request is turned away while the probe runs.
        assert_eq!(cb.admit(&mut entry, t1).0, AdmitDecision::Reject);

        assert!(cb.record(&mut entry, true, true, None, t1).is_none());
        assert_eq!(entry.state, CircuitState::HalfOpen);

        assert_eq!(cb.admit(&mut entry, t1).0, AdmitDecision::Probe);
        let closed = cb.record(&mut entry, true, true, None, t1);
        assert_eq!(
            closed,
            Some(Transition {
                from: CircuitState::HalfOpen,
                to: CircuitState::Closed
            })
        );
        assert_eq!(entry.consecutive_failures, 0);
        assert!(entry.window.is_empty());
        assert_eq!(cb.admit(&mut entry, t1).0, AdmitDecision::Admit);
    }

    #[test]
    fn test_probe_failure_reopens_and_restarts_cooldown() {
        let cfg = config();
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();
        let mut entry = open_entry(&cb, now);

        let t1 = now + Duration::from_secs(31);
        assert_eq!(cb.admit(&mut entry, t1).0, AdmitDecision::Probe);
        let reopened = cb.record(&mut entry, false, true, Some("timeout"), t1);
        assert_eq!(
            reopened,
            Some(Transition {
                from: CircuitState::HalfOpen,
                to: CircuitState::Open
            })
        );
        assert!(!entry.probe_in_flight);

        // The clock restarted at t1, not at the original opening.
        assert_eq!(cb.admit(&mut entry, t1 + Duration::from_secs(29)).0, AdmitDecision::Reject);
        assert_eq!(cb.admit(&mut entry, t1 + Duration::from_secs(30)).0, AdmitDecision::Probe);
    }

    #[test]
    fn test_straggler_outcomes_do_not_move_half_open() {
        let cfg = config();
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();
        let mut entry = open_entry(&cb, now);

        let t1 = now + Duration::from_secs(30);
        assert_eq!(cb.admit(&mut entry, t1).0, AdmitDecision::Probe);

        // A request admitted while still closed finishes late.
        assert!(cb.record(&mut entry, false, false, None, t1).is_none());
        assert_eq!(entry.state, CircuitState::HalfOpen);
        assert!(entry.probe_in_flight);
    }

    #[test]
    fn test_zero_timeout_probes_immediately() {
        let cfg = CircuitBreakerConfig {
            timeout_seconds: 0,
            ..config()
        };
        let cb = CircuitBreaker::new(&cfg);
        let now = Instant::now();
        let mut entry = open_entry(&cb, now);
        assert_eq!(cb.admit(&mut entry, now).0, AdmitDecision::Probe);
    }

    #[test]
    fn test_cooldown_elapsed_is_pure() {
        let start = Instant::now();
        assert!(!cooldown_elapsed(start, start, 1));
        assert!(cooldown_elapsed(start + Duration::from_secs(1), start, 1));
        // A clock reading before the change never counts as elapsed.
        assert!(!cooldown_elapsed(start, start + Duration::from_secs(5), 1));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"half_open\""
        );
    }
}
