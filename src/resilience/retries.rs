//! Retry budget for failover.
//!
//! # Design Decisions
//! - The budget is per request: `max_retries` extra attempts after the first
//! - Breaker-skipped candidates do not consume budget; only real attempts do
//! - Only failures that count against the breaker are retried; 4xx and client
//!   cancellation end the request immediately
//! - No wraparound: the walk ends at the last queue entry

use crate::error::UpstreamError;

/// Attempts left for one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
    attempts: u32,
}

impl RetryBudget {
    pub fn new(max_retries: u32) -> Self {
        Self {
            remaining: max_retries,
            attempts: 0,
        }
    }

    /// Note that an attempt is being made.
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Spend one retry after a failure. `false` when the budget is gone.
    pub fn try_consume(&mut self, failure: &UpstreamError) -> bool {
        if !is_retryable(failure) || self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

/// Whether moving to the next candidate can help.
pub fn is_retryable(failure: &UpstreamError) -> bool {
    failure.counts_against_breaker()
}
