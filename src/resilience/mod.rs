//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to provider:
//!     → circuit_breaker.rs (admit, probe single-flight)
//!     → timeouts.rs (first-byte / idle / non-streaming deadlines)
//!     → On failure: retries.rs (spend budget, advance to next candidate)
//!     → circuit_breaker.rs (record outcome, maybe open the circuit)
//! ```
//!
//! # Design Decisions
//! - Every upstream wait has a cancellable deadline unless configured as 0
//! - Circuit breakers are per (provider, app), never global
//! - Breaker transitions are computed, logged and counted; never thrown

pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Transition};
pub use retries::RetryBudget;
pub use timeouts::{TierTimeouts, TimeoutTier};
