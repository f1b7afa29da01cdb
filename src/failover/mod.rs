//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! Control plane add / remove / reorder
//!     → queue.rs (per-app ordered provider IDs, dense priorities)
//!
//! Inbound request
//!     → snapshot of the app's queue
//!     → selector.rs (walk in order, ask the breaker for admission)
//!     → Candidate (provider + admission guard) handed to the router
//! ```

pub mod queue;
pub mod selector;

pub use queue::{FailoverQueue, FailoverQueueItem, FailoverQueues, QueueError};
pub use selector::{Candidate, CandidateWalker};
