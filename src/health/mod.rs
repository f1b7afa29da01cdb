//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Router admits a candidate:
//!     → store.rs (look up / create entry for (provider, app))
//!     → circuit_breaker.rs decides Admit / Probe / Reject
//!
//! Attempt finishes:
//!     → Admission guard records the outcome
//!     → state.rs updates window, counters, timestamps
//!     → circuit_breaker.rs re-evaluates the state
//! ```
//!
//! # Design Decisions
//! - Only connection errors, timeouts and 5xx count as failures
//! - 4xx and client cancellations record nothing
//! - Health is per (provider, app), never global
//! - No background timers: Open → HalfOpen is decided on admission

pub mod state;
pub mod store;

pub use state::{HealthEntry, OutcomeWindow, ProviderHealth};
pub use store::{Admission, HealthStore, ProviderKey};
