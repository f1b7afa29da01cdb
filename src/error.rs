//! Error taxonomy of the request path.

use axum::http::StatusCode;

use crate::config::AppType;
use crate::resilience::timeouts::TimeoutTier;

/// Why a single upstream attempt did not produce a usable response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    /// Upstream unreachable.
    #[error("connect error: {0}")]
    Connect(String),

    #[error("{tier} timeout after {secs}s")]
    Timeout { tier: TimeoutTier, secs: u64 },

    /// Upstream answered 5xx.
    #[error("upstream returned {status}")]
    ServerError { status: StatusCode, body: String },

    /// Upstream answered 4xx; passed through verbatim.
    #[error("upstream rejected the request with {status}")]
    ClientError { status: StatusCode },

    /// The client went away before the exchange finished.
    #[error("client cancelled the request")]
    ClientCancelled,

    /// Transport failure after the connection was established.
    #[error("upstream transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    /// Whether this failure says something about provider health.
    pub fn counts_against_breaker(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout { .. } | Self::ServerError { .. } | Self::Transport(_) => true,
            Self::ClientError { .. } | Self::ClientCancelled => false,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Timeout { .. } => "timeout",
            Self::ServerError { .. } => "server_error",
            Self::ClientError { .. } => "client_error",
            Self::ClientCancelled => "client_cancelled",
            Self::Transport(_) => "transport",
        }
    }

    /// Map a `reqwest` failure.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Errors surfaced to the proxy's client.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("no application matches request path {0}")]
    UnknownApp(String),

    #[error("no provider configured for {0}")]
    NoProvider(AppType),

    #[error("all providers for {app} failed or are unavailable after {attempts} attempt(s)")]
    QueueExhausted {
        app: AppType,
        attempts: u32,
        /// Last underlying attempt failure, kept for diagnostics.
        last_error: Option<UpstreamError>,
    },
}

impl ProxyError {
    /// HTTP status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownApp(_) => StatusCode::NOT_FOUND,
            Self::NoProvider(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::QueueExhausted { last_error, .. } => match last_error {
                None => StatusCode::SERVICE_UNAVAILABLE,
                Some(UpstreamError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
                Some(UpstreamError::ServerError { status, .. }) => *status,
                Some(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownApp(_) => "unknown_app",
            Self::NoProvider(_) => "no_provider",
            Self::QueueExhausted { .. } => "queue_exhausted",
        }
    }
}
