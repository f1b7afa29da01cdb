//! Control subsystem.
//!
//! # Data Flow
//! ```text
//! Admin API / host application
//!     → service.rs (ControlPlane: validate, then mutate live state)
//!         → config/runtime.rs (tunables, current provider)
//!         → failover/queue.rs (queue edits)
//!         → health/store.rs (health view, manual reset)
//!         → takeover.rs (takeover flags, live config rewrite)
//!         → http/server.rs (start / stop)
//! ```

pub mod service;
pub mod takeover;

pub use service::{ActiveTarget, ControlError, ControlPlane, ProxyStatus};
pub use takeover::{DetachedRewriter, LiveConfigRewriter, RewriteError, TakeoverController, TakeoverHealth};
