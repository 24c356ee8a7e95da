use super::breaker::CircuitBreaker;
use super::types::RetryConfig;
use crate::error::{Failure, StoreError};
use crate::metrics;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Value of a successful guarded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    /// Invocations it took, including the successful one
    pub attempts: u32,
    /// Set when the success could not be recorded in the shared store
    pub store_fault: Option<StoreError>,
}

/// Retry executor with exponential backoff, reporting one outcome per
/// logical call to a circuit breaker
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `op` guarded by `breaker`
    pub async fn execute<F, Fut, T, E>(
        &self,
        breaker: &CircuitBreaker,
        op: F,
    ) -> Result<Attempted<T>, Failure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_with_cancel(breaker, &CancellationToken::new(), op)
            .await
    }

    /// Execute `op` guarded by `breaker`, abandoning the backoff when `cancel` fires.
    ///
    /// A cancelled call reports nothing to the breaker. The operation itself
    /// is never interrupted.
    pub async fn execute_with_cancel<F, Fut, T, E>(
        &self,
        breaker: &CircuitBreaker,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<Attempted<T>, Failure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let dependency = breaker.name();
        let started = Instant::now();

        match breaker.is_open().await {
            Ok(false) => {}
            Ok(true) => {
                metrics::record_fast_fail(dependency);
                metrics::record_call(dependency, "circuit_open", started.elapsed().as_secs_f64());
                return Err(Failure::CircuitOpen {
                    dependency: dependency.to_string(),
                });
            }
            Err(e) => {
                error!(dependency = %dependency, error = %e, "Circuit state unavailable");
                metrics::record_store_fault(dependency, "is_open");
                metrics::record_call(dependency, "store_fault", started.elapsed().as_secs_f64());
                return Err(Failure::StoreFault(e));
            }
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.create_backoff();
        let mut last_error = None;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(dependency, attempt, last_error, started));
            }

            attempt += 1;
            debug!(dependency = %dependency, attempt, max_attempts, "Executing call");

            match op().await {
                Ok(value) => {
                    metrics::record_attempt(dependency, true);
                    if attempt > 1 {
                        debug!(dependency = %dependency, attempt, "Call succeeded after retries");
                    }
                    let store_fault = breaker.record_success().await.err();
                    if let Some(e) = &store_fault {
                        error!(dependency = %dependency, error = %e, "Failed to record success");
                        metrics::record_store_fault(dependency, "record_success");
                    }
                    metrics::record_call(dependency, "success", started.elapsed().as_secs_f64());
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                        store_fault,
                    });
                }
                Err(e) => {
                    metrics::record_attempt(dependency, false);

                    if attempt >= max_attempts {
                        warn!(
                            dependency = %dependency,
                            attempt,
                            max_attempts,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            error = %e,
                            "Call failed after max attempts"
                        );

                        // One failure per logical call, however many attempts it took
                        let store_fault = breaker.record_failure().await.err();
                        if let Some(store_err) = &store_fault {
                            error!(
                                dependency = %dependency,
                                error = %store_err,
                                "Failed to record failure"
                            );
                            metrics::record_store_fault(dependency, "record_failure");
                        }
                        metrics::record_call(
                            dependency,
                            "exhausted_retries",
                            started.elapsed().as_secs_f64(),
                        );
                        return Err(Failure::ExhaustedRetries {
                            dependency: dependency.to_string(),
                            last_error: e,
                            attempts: attempt,
                            store_fault,
                        });
                    }

                    let wait = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.config.max_delay());
                    warn!(
                        dependency = %dependency,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Call failed, retrying after backoff"
                    );
                    last_error = Some(e);

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => {
                            return Err(self.cancelled(dependency, attempt, last_error, started));
                        }
                    }
                }
            }
        }
    }

    /// Delays slept between consecutive attempts of one call
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut backoff = self.create_backoff();
        (1..self.config.max_attempts.max(1))
            .map(|_| backoff.next_backoff().unwrap_or_else(|| self.config.max_delay()))
            .collect()
    }

    fn cancelled<E>(
        &self,
        dependency: &str,
        attempts: u32,
        last_error: Option<E>,
        started: Instant,
    ) -> Failure<E> {
        debug!(dependency = %dependency, attempts, "Call cancelled");
        metrics::record_call(dependency, "cancelled", started.elapsed().as_secs_f64());
        Failure::Cancelled {
            dependency: dependency.to_string(),
            attempts,
            last_error,
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.base_delay())
            .with_max_interval(self.config.max_delay())
            .with_multiplier(self.config.backoff_multiplier)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None) // Attempts are bounded by max_attempts
            .build()
    }
}
