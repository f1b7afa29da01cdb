//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all violations reported)
//!     → ProxyConfig (validated)
//!     → runtime.rs (per-app snapshots behind ArcSwap)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → control plane applies it (catalog + tunables swapped atomically)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Failover queues and takeover flags are runtime state; reloads leave them alone

pub mod loader;
pub mod runtime;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use runtime::{AppSettings, RuntimeSettings};
pub use schema::{
    AdminConfig, AppProxyConfig, AppType, ListenerConfig, LogFormat, ObservabilityConfig,
    ProviderConfig, ProxyConfig,
};
pub use validation::ValidationError;
