//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request ID, tracing, body limit)
//!     → request.rs (request ID, streaming detection, header filtering)
//!     → [routing layer resolves the app and walks the failover queue]
//!     → response.rs (metadata headers, JSON errors)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{X_FAILOVER_ATTEMPTS, X_FAILOVER_PROVIDER};
pub use server::{ProxyServer, ProxyServerInfo};
