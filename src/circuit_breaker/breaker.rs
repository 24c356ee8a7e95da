use super::types::{
    CircuitBreakerConfig, CircuitSnapshot, CircuitState, CircuitStatus, HalfOpenFailurePolicy,
};
use crate::error::StoreError;
use crate::metrics;
use crate::store::SharedStateStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Circuit breaker for a single external dependency.
///
/// The breaker keeps no state of its own: every decision reads the shared
/// store, and every change is written back with a compare-and-swap on the
/// record version. Instances with the same name and store act as one breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Configuration
    config: CircuitBreakerConfig,
    /// Shared state backend
    store: Arc<dyn SharedStateStore>,
    /// Dependency identifier
    name: String,
    /// Store key derived from the name
    key: String,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for `name` over `store`
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        store: Arc<dyn SharedStateStore>,
    ) -> Self {
        let name = name.into();
        let key = config.key_for(&name);

        debug!(
            dependency = %name,
            key = %key,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            recovery_timeout_secs = config.recovery_timeout_secs,
            "Creating circuit breaker"
        );

        Self {
            config,
            store,
            name,
            key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Gate a call: `true` means the call must not be attempted.
    ///
    /// Once the recovery timeout of an open circuit has elapsed this moves the
    /// breaker to HalfOpen and lets the caller through.
    pub async fn is_open(&self) -> Result<bool, StoreError> {
        let state = self.store.get(&self.key).await?;
        if state.status != CircuitStatus::Open {
            return Ok(false);
        }

        let now = Utc::now();
        if state.blocks_at(now) {
            debug!(
                dependency = %self.name,
                open_until = ?state.open_until,
                "Circuit breaker open, rejecting call"
            );
            return Ok(true);
        }

        if state.open_until.is_none() {
            warn!(dependency = %self.name, "Circuit open but no open_until timestamp");
        }

        let state = self
            .update(|state, now| {
                if state.status != CircuitStatus::Open || state.blocks_at(now) {
                    return false;
                }
                state.status = CircuitStatus::HalfOpen;
                state.consecutive_successes = 0;
                state.open_until = None;
                true
            })
            .await?;

        // Another process may have re-opened the circuit in the meantime
        Ok(state.blocks_at(Utc::now()))
    }

    /// Record a successful logical call
    pub async fn record_success(&self) -> Result<(), StoreError> {
        let success_threshold = self.config.success_threshold;
        let name = self.name.as_str();

        self.update(|state, _| match state.status {
            CircuitStatus::HalfOpen => {
                state.consecutive_successes += 1;
                debug!(
                    dependency = %name,
                    consecutive_successes = state.consecutive_successes,
                    threshold = success_threshold,
                    "Half-open trial call succeeded"
                );

                if state.consecutive_successes >= success_threshold {
                    *state = CircuitState {
                        version: state.version,
                        ..CircuitState::default()
                    };
                }
                true
            }
            CircuitStatus::Closed => {
                // Success clears accumulated failures
                if state.failures == 0 {
                    return false;
                }
                state.failures = 0;
                true
            }
            CircuitStatus::Open => {
                debug!(dependency = %name, "Recording success in open state");
                false
            }
        })
        .await?;

        Ok(())
    }

    /// Record a failed logical call
    pub async fn record_failure(&self) -> Result<(), StoreError> {
        let config = &self.config;
        let name = self.name.as_str();

        self.update(|state, now| {
            state.failures = state.failures.saturating_add(1);
            state.last_failure = Some(now);

            let reopen = match (state.status, config.half_open_failure_policy) {
                (CircuitStatus::HalfOpen, HalfOpenFailurePolicy::ReopenImmediately) => true,
                (CircuitStatus::HalfOpen, HalfOpenFailurePolicy::Cumulative)
                    if state.failures < config.failure_threshold =>
                {
                    // Literal semantics: a trial failure only counts towards
                    // the cumulative threshold. See HalfOpenFailurePolicy.
                    warn!(
                        dependency = %name,
                        failures = state.failures,
                        threshold = config.failure_threshold,
                        "Half-open trial call failed below threshold, circuit stays half-open"
                    );
                    false
                }
                _ => state.failures >= config.failure_threshold,
            };

            debug!(
                dependency = %name,
                failures = state.failures,
                threshold = config.failure_threshold,
                status = %state.status,
                "Call failed"
            );

            if reopen {
                state.status = CircuitStatus::Open;
                state.consecutive_successes = 0;
                state.open_until = Some(reopen_deadline(now, config));
            }
            true
        })
        .await?;

        Ok(())
    }

    /// Read-only status projection; never transitions the breaker
    pub async fn status(&self) -> Result<CircuitSnapshot, StoreError> {
        let state = self.store.get(&self.key).await?;
        Ok(state.snapshot(&self.name, Utc::now()))
    }

    /// Clear the stored state, returning the breaker to Closed
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store.forget(&self.key).await?;
        info!(dependency = %self.name, "Circuit breaker reset");
        metrics::record_circuit_breaker_state(&self.name, CircuitStatus::Closed);
        Ok(())
    }

    /// Apply `transition` to the current state and write it back atomically.
    ///
    /// `transition` returns `false` when there is nothing to write. It may run
    /// more than once when concurrent writers race.
    async fn update<F>(&self, mut transition: F) -> Result<CircuitState, StoreError>
    where
        F: FnMut(&mut CircuitState, DateTime<Utc>) -> bool,
    {
        for attempt in 1..=self.config.max_update_attempts {
            let current = self.store.get(&self.key).await?;
            let mut next = current.clone();

            if !transition(&mut next, Utc::now()) {
                return Ok(current);
            }

            if let Some(version) = self
                .store
                .compare_and_swap(&self.key, current.version, &next, self.config.state_ttl())
                .await?
            {
                next.version = version;
                if next.status != current.status {
                    self.log_transition(&current, &next);
                }
                return Ok(next);
            }

            debug!(
                dependency = %self.name,
                attempt,
                "Concurrent circuit state update, retrying"
            );
        }

        warn!(
            dependency = %self.name,
            attempts = self.config.max_update_attempts,
            "Giving up on contended circuit state update"
        );
        Err(StoreError::Contention {
            key: self.key.clone(),
            attempts: self.config.max_update_attempts,
        })
    }

    fn log_transition(&self, from: &CircuitState, to: &CircuitState) {
        match to.status {
            CircuitStatus::Open => info!(
                dependency = %self.name,
                failures = to.failures,
                open_until = ?to.open_until,
                "Circuit breaker opening"
            ),
            CircuitStatus::HalfOpen => info!(
                dependency = %self.name,
                "Circuit breaker transitioning to half-open"
            ),
            CircuitStatus::Closed => info!(
                dependency = %self.name,
                consecutive_successes = from.consecutive_successes + 1,
                "Circuit breaker closing"
            ),
        }
        metrics::record_circuit_breaker_transition(&self.name, from.status, to.status);
    }
}

fn reopen_deadline(now: DateTime<Utc>, config: &CircuitBreakerConfig) -> DateTime<Utc> {
    chrono::Duration::from_std(config.recovery_timeout())
        .ok()
        .and_then(|timeout| now.checked_add_signed(timeout))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
