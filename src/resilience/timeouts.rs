//! Timeout enforcement.
//!
//! # Responsibilities
//! - Pick the timeout tier from the request shape
//! - Wrap upstream calls with cancellable deadlines
//! - Bound the gap between streamed chunks
//!
//! A configured value of `0` disables that specific timeout.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::time::error::Elapsed;

use crate::config::AppProxyConfig;

/// The three timeout classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutTier {
    /// Time until the first streamed byte.
    StreamingFirstByte,
    /// Maximum gap between two streamed chunks.
    StreamingIdle,
    /// Whole non-streaming exchange.
    NonStreaming,
}

impl fmt::Display for TimeoutTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StreamingFirstByte => write!(f, "streaming first-byte"),
            Self::StreamingIdle => write!(f, "streaming idle"),
            Self::NonStreaming => write!(f, "non-streaming"),
        }
    }
}

fn seconds(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

/// Deadlines of one app, captured per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierTimeouts {
    pub first_byte: Option<Duration>,
    pub idle: Option<Duration>,
    pub non_streaming: Option<Duration>,
}

impl TierTimeouts {
    pub fn from_app(config: &AppProxyConfig) -> Self {
        Self {
            first_byte: seconds(config.streaming_first_byte_timeout),
            idle: seconds(config.streaming_idle_timeout),
            non_streaming: seconds(config.non_streaming_timeout),
        }
    }

    pub fn limit(&self, tier: TimeoutTier) -> Option<Duration> {
        match tier {
            TimeoutTier::StreamingFirstByte => self.first_byte,
            TimeoutTier::StreamingIdle => self.idle,
            TimeoutTier::NonStreaming => self.non_streaming,
        }
    }
}

/// Run `fut` under an optional deadline.
pub async fn with_deadline<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output, Elapsed> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await,
        None => Ok(fut.await),
    }
}

/// Next item of `stream`, failing if it takes longer than `limit`.
pub async fn next_within<S>(limit: Option<Duration>, stream: &mut S) -> Result<Option<S::Item>, Elapsed>
where
    S: Stream + Unpin,
{
    with_deadline(limit, stream.next()).await
}
