//! Shared registries consulted by the gate
//!
//! Both registries are cheap-to-clone handles around shared state, so one
//! instance can be injected into the gate, the reassembler and any number of
//! deferred re-checks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Logical ids whose reassembly already succeeded
///
/// Entries are only ever added.
#[derive(Clone, Debug, Default)]
pub struct CompletedRegistry {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl CompletedRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `logical_id` was already joined
    pub async fn contains(&self, logical_id: &str) -> bool {
        self.ids.lock().await.contains(logical_id)
    }

    /// Record a successful join. Returns `false` if the id was already present.
    pub async fn insert(&self, logical_id: &str) -> bool {
        self.ids.lock().await.insert(logical_id.to_string())
    }

    /// Number of joined archives
    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    /// Whether nothing has been joined yet
    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }
}

/// Time of the last gate evaluation per logical id
#[derive(Clone, Debug, Default)]
pub struct DebounceRegistry {
    stamps: Arc<Mutex<HashMap<String, Instant>>>,
}

impl DebounceRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `logical_id` with `now` unless it was stamped less than `interval` ago
    ///
    /// Returns `true` when the caller may evaluate. The check and the stamp
    /// happen under one lock, so of two concurrent callers only one wins.
    pub async fn try_stamp(&self, logical_id: &str, interval: Duration, now: Instant) -> bool {
        let mut stamps = self.stamps.lock().await;
        if let Some(last) = stamps.get(logical_id)
            && now.saturating_duration_since(*last) < interval
        {
            return false;
        }
        stamps.insert(logical_id.to_string(), now);
        true
    }

    /// Last evaluation time of `logical_id`
    pub async fn last_stamp(&self, logical_id: &str) -> Option<Instant> {
        self.stamps.lock().await.get(logical_id).copied()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completed_registry_is_shared_between_clones() {
        let registry = CompletedRegistry::new();
        let clone = registry.clone();

        assert!(registry.is_empty().await);
        assert!(clone.insert("movie").await);
        assert!(!registry.insert("movie").await);
        assert!(registry.contains("movie").await);
        assert!(!registry.contains("other").await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn debounce_blocks_within_interval() {
        let registry = DebounceRegistry::new();
        let interval = Duration::from_secs(3);
        let t0 = Instant::now();

        assert!(registry.try_stamp("a", interval, t0).await);
        assert!(!registry.try_stamp("a", interval, t0 + Duration::from_secs(1)).await);
        assert!(registry.try_stamp("b", interval, t0).await);
        assert!(registry.try_stamp("a", interval, t0 + Duration::from_secs(3)).await);
        assert_eq!(
            registry.last_stamp("a").await,
            Some(t0 + Duration::from_secs(3))
        );
    }

    #[tokio::test]
    async fn refused_evaluation_does_not_move_the_stamp() {
        let registry = DebounceRegistry::new();
        let interval = Duration::from_secs(3);
        let t0 = Instant::now();

        registry.try_stamp("a", interval, t0).await;
        registry
            .try_stamp("a", interval, t0 + Duration::from_secs(2))
            .await;
        assert_eq!(registry.last_stamp("a").await, Some(t0));
    }

    #[tokio::test]
    async fn concurrent_stamps_admit_exactly_one() {
        let registry = DebounceRegistry::new();
        let now = Instant::now();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .try_stamp("same", Duration::from_secs(60), now)
                        .await
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
