//! Circuit breaker and retry executor
//!
//! ```text
//! Closed   --(failures reach failure_threshold)-->            Open
//! Open     --(now >= open_until, observed by is_open)-->      HalfOpen
//! HalfOpen --(consecutive successes reach success_threshold)--> Closed
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryExecutor};
//! use resilience::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryStore::new());
//!     let breaker = CircuitBreaker::new("openai", CircuitBreakerConfig::default(), store);
//!     let executor = RetryExecutor::new(RetryConfig::default());
//!
//!     let result = executor
//!         .execute(&breaker, || async { Ok::<_, String>("generated text") })
//!         .await;
//!     assert!(result.is_ok());
//! }
//! ```

pub mod breaker;
pub mod retry;
pub mod service;
pub mod types;

pub use breaker::CircuitBreaker;
pub use retry::{Attempted, RetryExecutor};
pub use service::CircuitBreakerService;
pub use types::{
    CircuitBreakerConfig, CircuitSnapshot, CircuitState, CircuitStatus, HalfOpenFailurePolicy,
    RetryConfig,
};
