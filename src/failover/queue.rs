//! Priority-ordered failover queues.
//!
//! # Responsibilities
//! - Keep one ordered list of provider IDs per app
//! - Assign dense priorities (1 = highest)
//! - Reject duplicates and malformed reorders
//!
//! # Design Decisions
//! - Every mutation re-verifies "no gap, no duplicate" before committing
//! - Queues are runtime state; config reloads never overwrite them

use std::collections::HashSet;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::AppType;

/// One queue slot as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverQueueItem {
    pub app_type: AppType,
    pub provider_id: String,
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("provider '{0}' is already in the failover queue")]
    Duplicate(String),

    #[error("provider '{0}' is not in the failover queue")]
    NotQueued(String),

    #[error("invalid ordering: {0}")]
    InvalidOrdering(String),
}

/// The queue of a single app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailoverQueue {
    entries: Vec<(u32, String)>,
}

impl FailoverQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.entries.iter().any(|(_, id)| id == provider_id)
    }

    /// Provider IDs in ascending priority.
    pub fn provider_ids(&self) -> Vec<String> {
        self.entries.iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn items(&self, app_type: AppType) -> Vec<FailoverQueueItem> {
        self.entries
            .iter()
            .map(|(priority, id)| FailoverQueueItem {
                app_type,
                provider_id: id.clone(),
                priority: *priority,
                provider_name: None,
            })
            .collect()
    }

    /// Append at the lowest priority.
    pub fn add(&mut self, provider_id: &str) -> Result<(), QueueError> {
        if self.contains(provider_id) {
            return Err(QueueError::Duplicate(provider_id.to_string()));
        }
        let mut next = self.clone();
        next.entries.push((0, provider_id.to_string()));
        next.compact();
        self.commit(next)
    }

    /// Remove and close the gap.
    pub fn remove(&mut self, provider_id: &str) -> Result<(), QueueError> {
        if !self.contains(provider_id) {
            return Err(QueueError::NotQueued(provider_id.to_string()));
        }
        let mut next = self.clone();
        next.entries.retain(|(_, id)| id != provider_id);
        next.compact();
        self.commit(next)
    }

    /// Replace the order. `ordering` must be a permutation of the members.
    pub fn reorder(&mut self, ordering: &[String]) -> Result<(), QueueError> {
        if ordering.len() != self.entries.len() {
            return Err(QueueError::InvalidOrdering(format!(
                "expected {} provider(s), got {}",
                self.entries.len(),
                ordering.len()
            )));
        }
        if let Some(stranger) = ordering.iter().find(|id| !self.contains(id)) {
            return Err(QueueError::NotQueued(stranger.clone()));
        }
        let mut next = Self {
            entries: ordering.iter().map(|id| (0, id.clone())).collect(),
        };
        next.compact();
        self.commit(next)
    }

    fn compact(&mut self) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.0 = index as u32 + 1;
        }
    }

    fn commit(&mut self, next: Self) -> Result<(), QueueError> {
        next.verify()?;
        *self = next;
        Ok(())
    }

    /// Priorities are exactly 1..=N and every provider appears once.
    pub fn verify(&self) -> Result<(), QueueError> {
        let mut seen = HashSet::new();
        for (index, (priority, id)) in self.entries.iter().enumerate() {
            if *priority != index as u32 + 1 {
                return Err(QueueError::InvalidOrdering(format!(
                    "priority {priority} at position {}",
                    index + 1
                )));
            }
            if !seen.insert(id.as_str()) {
                return Err(QueueError::Duplicate(id.clone()));
            }
        }
        Ok(())
    }
}

/// Queues of every app.
#[derive(Debug, Default)]
pub struct FailoverQueues {
    queues: DashMap<AppType, FailoverQueue>,
}

impl FailoverQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace an app's queue wholesale, used at startup.
    pub fn seed(&self, app: AppType, provider_ids: &[String]) -> Result<(), QueueError> {
        let mut queue = FailoverQueue::new();
        for id in provider_ids {
            queue.add(id)?;
        }
        self.queues.insert(app, queue);
        Ok(())
    }

    pub fn list(&self, app: AppType) -> Vec<FailoverQueueItem> {
        self.queues
            .get(&app)
            .map(|q| q.items(app))
            .unwrap_or_default()
    }

    pub fn provider_ids(&self, app: AppType) -> Vec<String> {
        self.queues
            .get(&app)
            .map(|q| q.provider_ids())
            .unwrap_or_default()
    }

    pub fn contains(&self, app: AppType, provider_id: &str) -> bool {
        self.queues
            .get(&app)
            .is_some_and(|q| q.contains(provider_id))
    }

    pub fn add(&self, app: AppType, provider_id: &str) -> Result<Vec<FailoverQueueItem>, QueueError> {
        let mut queue = self.queues.entry(app).or_default();
        queue.add(provider_id)?;
        tracing::info!(app = %app, provider = %provider_id, priority = queue.len(), "Added to failover queue");
        Ok(queue.items(app))
    }

    pub fn remove(&self, app: AppType, provider_id: &str) -> Result<Vec<FailoverQueueItem>, QueueError> {
        let mut queue = self.queues.entry(app).or_default();
        queue.remove(provider_id)?;
        tracing::info!(app = %app, provider = %provider_id, "Removed from failover queue");
        Ok(queue.items(app))
    }

    pub fn reorder(&self, app: AppType, ordering: &[String]) -> Result<Vec<FailoverQueueItem>, QueueError> {
        let mut queue = self.queues.entry(app).or_default();
        queue.reorder(ordering)?;
        tracing::info!(app = %app, providers = ?ordering, "Failover queue reordered");
        Ok(queue.items(app))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(queue: &FailoverQueue) -> Vec<String> {
        queue.provider_ids()
    }

    #[test]
    fn test_add_appends_at_lowest_priority() {
        let mut queue = FailoverQueue::new();
        queue.add("a").unwrap();
        queue.add("b").unwrap();
        let items = queue.items(AppType::Claude);
        assert_eq!(items[0].priority, 1);
        assert_eq!(items[1].priority, 2);
        assert_eq!(items[1].provider_id, "b");
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut queue = FailoverQueue::new();
        queue.add("a").unwrap();
        assert_eq!(queue.add("a"), Err(QueueError::Duplicate("a".into())));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_compacts_and_add_back_restores() {
        let mut queue = FailoverQueue::new();
        for id in ["a", "b", "c"] {
            queue.add(id).unwrap();
        }
        queue.remove("b").unwrap();
        let items = queue.items(AppType::Codex);
        assert_eq!(
            items.iter().map(|i| (i.priority, i.provider_id.as_str())).collect::<Vec<_>>(),
            vec![(1, "a"), (2, "c")]
        );

        queue.add("b").unwrap();
        assert_eq!(ids(&queue), vec!["a", "c", "b"]);
        queue.verify().unwrap();

        queue.remove("b").unwrap();
        assert_eq!(ids(&queue), vec!["a", "c"]);
    }

    #[test]
    fn test_remove_unknown() {
        let mut queue = FailoverQueue::new();
        assert_eq!(queue.remove("x"), Err(QueueError::NotQueued("x".into())));
    }

    #[test]
    fn test_reorder_requires_permutation() {
        let mut queue = FailoverQueue::new();
        for id in ["a", "b", "c"] {
            queue.add(id).unwrap();
        }

        queue.reorder(&["c".into(), "a".into(), "b".into()]).unwrap();
        assert_eq!(ids(&queue), vec!["c", "a", "b"]);

        assert!(matches!(
            queue.reorder(&["a".into(), "b".into()]),
            Err(QueueError::InvalidOrdering(_))
        ));
        assert!(matches!(
            queue.reorder(&["a".into(), "a".into(), "b".into()]),
            Err(QueueError::Duplicate(_))
        ));
        assert!(matches!(
            queue.reorder(&["a".into(), "b".into(), "z".into()]),
            Err(QueueError::NotQueued(_))
        ));
        assert_eq!(ids(&queue), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_queues_are_per_app() {
        let queues = FailoverQueues::new();
        queues.add(AppType::Claude, "a").unwrap();
        queues.add(AppType::Gemini, "a").unwrap();
        assert!(queues.list(AppType::Codex).is_empty());
        assert!(queues.contains(AppType::Gemini, "a"));

        queues.seed(AppType::Claude, &["x".into(), "y".into()]).unwrap();
        assert_eq!(queues.provider_ids(AppType::Claude), vec!["x", "y"]);
        assert!(queues.seed(AppType::Claude, &["x".into(), "x".into()]).is_err());
    }
}
