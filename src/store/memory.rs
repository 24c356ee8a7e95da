use super::SharedStateStore;
use crate::circuit_breaker::types::CircuitState;
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// In-memory state store.
///
/// Clones share the same map, so every breaker built over a clone sees the
/// same state. Expiry is checked lazily on access.
///
/// Versions come from one store-wide counter, so a key that is forgotten or
/// expires never hands out a version a reader may still hold.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, StoredState>>,
    generation: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
struct StoredState {
    state: CircuitState,
    expires_at: Instant,
}

impl StoredState {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) records
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.value().is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_version(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn stored(state: &CircuitState, version: u64, ttl: Duration) -> StoredState {
        StoredState {
            state: CircuitState {
                version,
                ..state.clone()
            },
            expires_at: Instant::now() + ttl,
        }
    }
}

#[async_trait]
impl SharedStateStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<CircuitState, StoreError> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(entry.state.clone());
            }
        }

        // Drop the expired record, unless a writer replaced it meanwhile
        self.entries.remove_if(key, |_, stored| stored.is_expired());
        Ok(CircuitState::default())
    }

    async fn put(&self, key: &str, state: &CircuitState, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), Self::stored(state, self.next_version(), ttl));
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: u64,
        state: &CircuitState,
        ttl: Duration,
    ) -> Result<Option<u64>, StoreError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = if occupied.get().is_expired() {
                    0
                } else {
                    occupied.get().state.version
                };
                if current != expected_version {
                    debug!(key, current, expected_version, "Version mismatch");
                    return Ok(None);
                }
                let version = self.next_version();
                occupied.insert(Self::stored(state, version, ttl));
                Ok(Some(version))
            }
            Entry::Vacant(vacant) => {
                if expected_version != 0 {
                    debug!(key, expected_version, "Record vanished before update");
                    return Ok(None);
                }
                let version = self.next_version();
                vacant.insert(Self::stored(state, version, ttl));
                Ok(Some(version))
            }
        }
    }

    async fn forget(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::types::CircuitStatus;

    fn open_state() -> CircuitState {
        CircuitState {
            status: CircuitStatus::Open,
            failures: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_key_reads_default() {
        let store = InMemoryStore::new();
        let state = store.get("resilience:circuit:openai").await.unwrap();
        assert_eq!(state, CircuitState::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_put_then_get_bumps_version() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);

        store.put("k", &open_state(), ttl).await.unwrap();
        let first = store.get("k").await.unwrap();
        assert_eq!(first.status, CircuitStatus::Open);
        assert_eq!(first.failures, 5);
        assert_eq!(first.version, 1);

        store.put("k", &CircuitState::default(), ttl).await.unwrap();
        assert!(store.get("k").await.unwrap().version > first.version);
    }

    #[tokio::test]
    async fn test_compare_and_swap_rejects_stale_version() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);

        let first = store
            .compare_and_swap("k", 0, &open_state(), ttl)
            .await
            .unwrap()
            .unwrap();
        // A second writer that also read version 0 loses
        assert_eq!(
            store
                .compare_and_swap("k", 0, &CircuitState::default(), ttl)
                .await
                .unwrap(),
            None
        );

        let current = store.get("k").await.unwrap();
        assert_eq!(current.status, CircuitStatus::Open);
        assert_eq!(current.version, first);
        let second = store
            .compare_and_swap("k", current.version, &CircuitState::default(), ttl)
            .await
            .unwrap()
            .unwrap();
        assert!(second > first);
        assert_eq!(store.get("k").await.unwrap().version, second);
    }

    #[tokio::test]
    async fn test_compare_and_swap_on_forgotten_key() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);

        store.put("k", &open_state(), ttl).await.unwrap();
        store.forget("k").await.unwrap();

        assert!(store.compare_and_swap("k", 1, &open_state(), ttl).await.unwrap().is_none());
        assert!(store.compare_and_swap("k", 0, &open_state(), ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_versions_are_not_reused_after_forget() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);

        for _ in 0..4 {
            let current = store.get("k").await.unwrap();
            store
                .compare_and_swap("k", current.version, &open_state(), ttl)
                .await
                .unwrap();
        }
        let stale = store.get("k").await.unwrap();

        store.forget("k").await.unwrap();
        for _ in 0..4 {
            let current = store.get("k").await.unwrap();
            assert_ne!(current.version, stale.version);
            store
                .compare_and_swap("k", current.version, &CircuitState::default(), ttl)
                .await
                .unwrap();
        }

        assert!(store
            .compare_and_swap("k", stale.version, &stale, ttl)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.get("k").await.unwrap().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_reads_default() {
        let store = InMemoryStore::new();
        store
            .put("k", &open_state(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.get("k").await.unwrap(), CircuitState::default());
        assert!(store.is_empty());
        // An expired record counts as absent for CAS too
        assert!(store
            .compare_and_swap("k", 0, &open_state(), Duration::from_secs(5))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_versions_are_not_reused_after_expiry() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(5);

        store.put("k", &open_state(), ttl).await.unwrap();
        let stale = store.get("k").await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        store.put("k", &CircuitState::default(), ttl).await.unwrap();

        assert!(store
            .compare_and_swap("k", stale.version, &stale, ttl)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = InMemoryStore::new();
        let other = store.clone();

        store
            .put("k", &open_state(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(other.get("k").await.unwrap().status, CircuitStatus::Open);
    }
}
