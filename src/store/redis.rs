use super::lua_scripts::{COMPARE_AND_SWAP_SCRIPT, PUT_SCRIPT};
use super::SharedStateStore;
use crate::circuit_breaker::types::{CircuitState, CircuitStatus};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};

/// Redis-backed state store shared by every process using the same server
#[derive(Clone)]
pub struct RedisStore {
    /// Redis connection manager, cloned per command
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to the Redis server at `redis_url`
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis state store: {}", e);
            StoreError::from(e)
        })?;

        Ok(Self { connection })
    }

    /// Counter the record's versions are drawn from; outlives the record
    fn generation_key(key: &str) -> String {
        format!("{}:generation", key)
    }

    fn state_args(state: &CircuitState) -> Vec<String> {
        vec![
            state.status.as_str().to_string(),
            state.failures.to_string(),
            state.consecutive_successes.to_string(),
            encode_timestamp(state.last_failure),
            encode_timestamp(state.open_until),
        ]
    }
}

#[async_trait]
impl SharedStateStore for RedisStore {
    async fn get(&self, key: &str) -> Result<CircuitState, StoreError> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;

        if fields.is_empty() {
            return Ok(CircuitState::default());
        }

        decode_state(key, &fields)
    }

    async fn put(&self, key: &str, state: &CircuitState, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let script = Script::new(PUT_SCRIPT);
        let version = script
            .key(key)
            .key(Self::generation_key(key))
            .arg(ttl_secs(ttl))
            .arg(Self::state_args(state))
            .invoke_async::<_, i64>(&mut conn)
            .await?;

        debug!(key, version, status = %state.status, "Stored circuit state");
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_version: u64,
        state: &CircuitState,
        ttl: Duration,
    ) -> Result<Option<u64>, StoreError> {
        let mut conn = self.connection.clone();
        let script = Script::new(COMPARE_AND_SWAP_SCRIPT);
        let version = script
            .key(key)
            .key(Self::generation_key(key))
            .arg(expected_version)
            .arg(ttl_secs(ttl))
            .arg(Self::state_args(state))
            .invoke_async::<_, u64>(&mut conn)
            .await?;

        if version == 0 {
            debug!(key, expected_version, "Version mismatch");
            return Ok(None);
        }
        Ok(Some(version))
    }

    async fn forget(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Redis rejects EXPIRE 0, so sub-second TTLs round up
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn encode_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.timestamp_millis().to_string())
        .unwrap_or_default()
}

fn decode_state(key: &str, fields: &HashMap<String, String>) -> Result<CircuitState, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        key: key.to_string(),
        reason,
    };

    let status = match fields.get("status") {
        Some(raw) => raw.parse::<CircuitStatus>().map_err(corrupt)?,
        None => CircuitStatus::Closed,
    };

    Ok(CircuitState {
        status,
        failures: decode_number(fields, "failures").map_err(corrupt)?,
        consecutive_successes: decode_number(fields, "consecutive_successes").map_err(corrupt)?,
        last_failure: decode_timestamp(fields, "last_failure").map_err(corrupt)?,
        open_until: decode_timestamp(fields, "open_until").map_err(corrupt)?,
        version: decode_number(fields, "version").map_err(corrupt)?,
    })
}

fn decode_number<T>(fields: &HashMap<String, String>, name: &str) -> Result<T, String>
where
    T: std::str::FromStr + Default,
{
    match fields.get(name).map(String::as_str) {
        None | Some("") => Ok(T::default()),
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("field '{}' is not a number: '{}'", name, raw)),
    }
}

fn decode_timestamp(
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<Option<DateTime<Utc>>, String> {
    match fields.get(name).map(String::as_str) {
        None | Some("") => Ok(None),
        Some(raw) => {
            let millis: i64 = raw
                .parse()
                .map_err(|_| format!("field '{}' is not a timestamp: '{}'", name, raw))?;
            DateTime::from_timestamp_millis(millis)
                .map(Some)
                .ok_or_else(|| format!("field '{}' is out of range: {}", name, millis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_decode_full_record() {
        let raw = fields(&[
            ("status", "open"),
            ("failures", "5"),
            ("consecutive_successes", "0"),
            ("last_failure", "1700000000000"),
            ("open_until", "1700000300000"),
            ("version", "7"),
        ]);

        let state = decode_state("k", &raw).unwrap();
        assert_eq!(state.status, CircuitStatus::Open);
        assert_eq!(state.failures, 5);
        assert_eq!(state.version, 7);
        assert_eq!(
            state.open_until.unwrap().timestamp_millis() - state.last_failure.unwrap().timestamp_millis(),
            300_000
        );
    }

    #[test]
    fn test_decode_empty_timestamps() {
        let raw = fields(&[
            ("status", "half_open"),
            ("failures", "5"),
            ("consecutive_successes", "1"),
            ("last_failure", ""),
            ("open_until", ""),
            ("version", "3"),
        ]);

        let state = decode_state("k", &raw).unwrap();
        assert_eq!(state.status, CircuitStatus::HalfOpen);
        assert_eq!(state.consecutive_successes, 1);
        assert!(state.last_failure.is_none());
        assert!(state.open_until.is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let raw = fields(&[("status", "ajar"), ("version", "1")]);
        assert!(matches!(
            decode_state("k", &raw),
            Err(StoreError::Corrupt { .. })
        ));

        let raw = fields(&[("status", "closed"), ("failures", "many")]);
        assert!(matches!(
            decode_state("k", &raw),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_encode_timestamp() {
        assert_eq!(encode_timestamp(None), "");
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(encode_timestamp(Some(ts)), "1700000000123");
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
    }

    // These tests require a running Redis instance
    // They are ignored by default. Run with: cargo test -- --ignored

    async fn create_test_store() -> RedisStore {
        RedisStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis")
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_missing_key_reads_default() {
        let store = create_test_store().await;
        let key = format!("test-missing-{}", rand::random::<u32>());
        assert_eq!(store.get(&key).await.unwrap(), CircuitState::default());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_compare_and_swap() {
        let store = create_test_store().await;
        let key = format!("test-cas-{}", rand::random::<u32>());
        let ttl = Duration::from_secs(60);
        let open = CircuitState {
            status: CircuitStatus::Open,
            failures: 5,
            last_failure: Some(Utc::now()),
            open_until: Some(Utc::now()),
            ..Default::default()
        };

        let first = store.compare_and_swap(&key, 0, &open, ttl).await.unwrap();
        assert_eq!(first, Some(1));
        assert_eq!(store.compare_and_swap(&key, 0, &open, ttl).await.unwrap(), None);

        let stored = store.get(&key).await.unwrap();
        assert_eq!(stored.status, CircuitStatus::Open);
        assert_eq!(stored.failures, 5);
        assert_eq!(stored.version, 1);

        store.put(&key, &CircuitState::default(), ttl).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().version, 2);

        store.forget(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), CircuitState::default());
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_versions_survive_forget() {
        let store = create_test_store().await;
        let key = format!("test-generation-{}", rand::random::<u32>());
        let ttl = Duration::from_secs(60);
        let open = CircuitState {
            status: CircuitStatus::Open,
            failures: 4,
            ..Default::default()
        };

        store.compare_and_swap(&key, 0, &open, ttl).await.unwrap();
        let stale = store.get(&key).await.unwrap();

        store.forget(&key).await.unwrap();
        let fresh = store
            .compare_and_swap(&key, 0, &CircuitState::default(), ttl)
            .await
            .unwrap();
        assert!(fresh > Some(stale.version));

        assert_eq!(
            store.compare_and_swap(&key, stale.version, &stale, ttl).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_connection() {
        let store = create_test_store().await;
        assert!(store.ping().await.is_ok());
    }
}
