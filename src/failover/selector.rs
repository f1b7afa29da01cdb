//! Candidate selection for one request.
//!
//! Walks a snapshot of the queue in priority order exactly once. Providers
//! whose breaker rejects them (Open and cooling down, or HalfOpen with a
//! probe already in flight) are skipped without an attempt; the walk never
//! wraps around to the first entry.

use std::sync::Arc;

use crate::config::AppType;
use crate::health::{Admission, HealthStore, ProviderKey};
use crate::provider::{Provider, ProviderCatalog};
use crate::resilience::CircuitBreakerConfig;

/// A provider cleared to receive one attempt.
#[derive(Debug)]
pub struct Candidate {
    pub provider: Arc<Provider>,
    pub admission: Admission,
}

/// Single-pass iterator over admitted candidates.
pub struct CandidateWalker<'a> {
    app: AppType,
    order: std::vec::IntoIter<String>,
    health: &'a HealthStore,
    catalog: &'a dyn ProviderCatalog,
    breaker: CircuitBreakerConfig,
    skipped: u32,
}

impl<'a> CandidateWalker<'a> {
    pub fn new(
        app: AppType,
        order: Vec<String>,
        health: &'a HealthStore,
        catalog: &'a dyn ProviderCatalog,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            app,
            order: order.into_iter(),
            health,
            catalog,
            breaker,
            skipped: 0,
        }
    }

    /// Candidates passed over without an attempt.
    pub fn skipped(&self) -> u32 {
        self.skipped
    }
}

impl Iterator for CandidateWalker<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        for provider_id in self.order.by_ref() {
            let Some(provider) = self.catalog.get(self.app, &provider_id) else {
                tracing::warn!(app = %self.app, provider = %provider_id, "Queued provider missing from catalog");
                self.skipped += 1;
                continue;
            };
            let key = ProviderKey::new(provider_id, self.app);
            match self.health.try_admit(&key, &self.breaker) {
                Some(admission) => return Some(Candidate { provider, admission }),
                None => self.skipped += 1,
            }
        }
        None
    }
}
