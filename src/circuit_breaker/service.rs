use super::breaker::CircuitBreaker;
use super::retry::{Attempted, RetryExecutor};
use super::types::{CircuitBreakerConfig, CircuitSnapshot, RetryConfig};
use crate::config::ResilienceConfig;
use crate::error::{Failure, Result, StoreError};
use crate::store::{self, SharedStateStore};
use dashmap::DashMap;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Guards calls to any number of named dependencies over one shared store
#[derive(Debug, Clone)]
pub struct CircuitBreakerService {
    /// Breaker handles per dependency; the state itself lives in the store
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    store: Arc<dyn SharedStateStore>,
    /// Configuration applied to every breaker
    config: CircuitBreakerConfig,
    executor: RetryExecutor,
}

impl CircuitBreakerService {
    /// Create a new circuit breaker service
    pub fn new(
        store: Arc<dyn SharedStateStore>,
        config: CircuitBreakerConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            store,
            config,
            executor: RetryExecutor::new(retry),
        }
    }

    /// Validate `config`, connect its store and build the service
    pub async fn from_config(config: &ResilienceConfig) -> Result<Self> {
        config.validate()?;
        let store = store::connect(&config.store).await?;

        info!(
            failure_threshold = config.circuit_breaker.failure_threshold,
            max_attempts = config.retry.max_attempts,
            "Resilience layer initialized"
        );

        Ok(Self::new(
            store,
            config.circuit_breaker.clone(),
            config.retry.clone(),
        ))
    }

    /// Get or create the breaker for a dependency
    pub fn breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                debug!(dependency = dependency, "Creating new circuit breaker");
                Arc::new(CircuitBreaker::new(
                    dependency,
                    self.config.clone(),
                    self.store.clone(),
                ))
            })
            .clone()
    }

    /// Run `op` against `dependency` with retries, guarded by its breaker
    pub async fn execute<F, Fut, T, E>(
        &self,
        dependency: &str,
        op: F,
    ) -> std::result::Result<Attempted<T>, Failure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let breaker = self.breaker(dependency);
        self.executor.execute(&breaker, op).await
    }

    /// Like [`execute`](Self::execute), abandoning the backoff when `cancel` fires
    pub async fn execute_with_cancel<F, Fut, T, E>(
        &self,
        dependency: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> std::result::Result<Attempted<T>, Failure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let breaker = self.breaker(dependency);
        self.executor
            .execute_with_cancel(&breaker, cancel, op)
            .await
    }

    /// Status projection of one dependency
    pub async fn status(&self, dependency: &str) -> std::result::Result<CircuitSnapshot, StoreError> {
        self.breaker(dependency).status().await
    }

    /// Status projections of every dependency this service has seen
    pub async fn all_status(&self) -> std::result::Result<Vec<CircuitSnapshot>, StoreError> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();

        let mut snapshots = join_all(breakers.iter().map(|b| b.status()))
            .await
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        snapshots.sort_by(|a, b| a.dependency.cmp(&b.dependency));
        Ok(snapshots)
    }

    /// Operator-triggered recovery of one dependency
    pub async fn reset(&self, dependency: &str) -> std::result::Result<(), StoreError> {
        self.breaker(dependency).reset().await
    }

    /// Names of dependencies with a breaker in this service
    pub fn dependencies(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn store(&self) -> &Arc<dyn SharedStateStore> {
        &self.store
    }
}
