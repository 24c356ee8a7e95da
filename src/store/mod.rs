//! Shared circuit state storage
//!
//! Breakers never hold their state in process memory. Every read and write
//! goes through a [`SharedStateStore`], so all processes pointed at the same
//! backend observe one state per breaker identity.
//!
//! - [`InMemoryStore`]: shared between tasks of one process, used in tests
//! - [`RedisStore`]: shared between processes and hosts
//!
//! Writes that depend on a previous read use [`SharedStateStore::compare_and_swap`]
//! with the `version` of the record that was read.

pub mod lua_scripts;
pub mod memory;
pub mod redis;

pub use memory::InMemoryStore;
pub use redis::RedisStore;

use crate::circuit_breaker::types::CircuitState;
use crate::config::StoreConfig;
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Key/value store with per-key expiry holding one [`CircuitState`] per key
#[async_trait]
pub trait SharedStateStore: Send + Sync + std::fmt::Debug {
    /// Read the state under `key`.
    ///
    /// Absent or expired keys yield the default Closed state with version 0.
    async fn get(&self, key: &str) -> Result<CircuitState, StoreError>;

    /// Overwrite the state under `key` and restart its expiry
    async fn put(&self, key: &str, state: &CircuitState, ttl: Duration) -> Result<(), StoreError>;

    /// Write `state` only if the stored version still equals `expected_version`.
    ///
    /// Returns the new version, or `None` when another writer got there first.
    /// Versions are never reused for a key, even after [`forget`](Self::forget)
    /// or expiry, so a writer holding an old version can not win.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: u64,
        state: &CircuitState,
        ttl: Duration,
    ) -> Result<Option<u64>, StoreError>;

    /// Remove the state under `key` immediately
    async fn forget(&self, key: &str) -> Result<(), StoreError>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Build the store selected by configuration
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn SharedStateStore>, StoreError> {
    match config {
        StoreConfig::Memory => {
            info!("Using in-memory circuit state store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreConfig::Redis { url } => {
            info!("Using Redis circuit state store");
            let store = RedisStore::new(url).await?;
            store.ping().await?;
            Ok(Arc::new(store))
        }
    }
}
