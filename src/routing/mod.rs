//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (headers, path)
//!     → matcher.rs (which app? which path to forward?)
//!     → router.rs (queue walk, breaker admission, upstream attempt)
//!     → RoutedResponse or ProxyError
//! ```
//!
//! # Design Decisions
//! - Matchers are fixed at startup; the queue and settings are live
//! - Deterministic: same input always matches the same app
//! - First match wins

pub mod matcher;
pub mod router;

pub use matcher::{AppMatch, AppResolver};
pub use router::{ProxyRequest, RequestRouter, ResponseBody, RoutedResponse};
