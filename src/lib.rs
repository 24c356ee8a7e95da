//! Resilience layer for calls to external generative and deployment APIs.
//!
//! A [`CircuitBreaker`](circuit_breaker::CircuitBreaker) per dependency keeps
//! its state in a [`SharedStateStore`](store::SharedStateStore), so every
//! process pointed at the same store shares one breaker. A
//! [`RetryExecutor`](circuit_breaker::RetryExecutor) wraps each logical call
//! with bounded retries and exponential backoff and reports one outcome per
//! call to the breaker.

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod store;

pub use circuit_breaker::{
    Attempted, CircuitBreaker, CircuitBreakerService, CircuitSnapshot, CircuitStatus,
    RetryExecutor,
};
pub use config::ResilienceConfig;
pub use error::{Failure, FailureKind, ResilienceError, StoreError};
pub use store::{InMemoryStore, RedisStore, SharedStateStore};

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resilience=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
