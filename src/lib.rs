//! Local failover proxy for LLM API providers.

pub mod admin;
pub mod config;
pub mod control;
pub mod error;
pub mod failover;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod provider;
pub mod resilience;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use control::ControlPlane;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
