use crate::circuit_breaker::types::CircuitStatus;
use crate::error::{ResilienceError, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the Prometheus recorder. Call once per process.
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ResilienceError::Config(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        // Circuit breaker metrics
        describe_gauge!(
            "resilience_circuit_breaker_state",
            "Circuit breaker state (0 = closed, 1 = open, 2 = half-open)"
        );
        describe_counter!(
            "resilience_circuit_breaker_transitions_total",
            "Total number of circuit breaker state transitions"
        );

        // Call metrics
        describe_counter!(
            "resilience_attempts_total",
            "Total number of invocations of guarded operations"
        );
        describe_counter!(
            "resilience_fast_fail_total",
            "Total number of calls rejected by an open circuit"
        );
        describe_counter!(
            "resilience_calls_total",
            "Total number of logical guarded calls by outcome"
        );
        describe_histogram!(
            "resilience_call_duration_seconds",
            "Duration of logical guarded calls including backoff"
        );

        describe_counter!(
            "resilience_store_faults_total",
            "Total number of shared state store faults"
        );

        debug!("All metrics registered with descriptions");
    }

    pub fn handle(&self) -> Arc<PrometheusHandle> {
        self.handle.clone()
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Record circuit breaker state
pub fn record_circuit_breaker_state(dependency: &str, status: CircuitStatus) {
    let labels = [("dependency", dependency.to_string())];
    gauge!("resilience_circuit_breaker_state", &labels).set(status.as_gauge() as f64);
}

/// Record circuit breaker transition
pub fn record_circuit_breaker_transition(dependency: &str, from: CircuitStatus, to: CircuitStatus) {
    let labels = [
        ("dependency", dependency.to_string()),
        ("from", from.to_string()),
        ("to", to.to_string()),
    ];
    counter!("resilience_circuit_breaker_transitions_total", &labels).increment(1);
    record_circuit_breaker_state(dependency, to);
}

/// Record one invocation of a guarded operation
pub fn record_attempt(dependency: &str, success: bool) {
    let labels = [
        ("dependency", dependency.to_string()),
        ("outcome", if success { "success" } else { "failure" }.to_string()),
    ];
    counter!("resilience_attempts_total", &labels).increment(1);
}

/// Record a call rejected without invoking the operation
pub fn record_fast_fail(dependency: &str) {
    let labels = [("dependency", dependency.to_string())];
    counter!("resilience_fast_fail_total", &labels).increment(1);
}

/// Record the outcome of a logical call
pub fn record_call(dependency: &str, outcome: &str, duration: f64) {
    let labels = [
        ("dependency", dependency.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("resilience_calls_total", &labels).increment(1);
    histogram!("resilience_call_duration_seconds", &labels).record(duration);
}

/// Record a shared state store fault
pub fn record_store_fault(dependency: &str, operation: &str) {
    let labels = [
        ("dependency", dependency.to_string()),
        ("operation", operation.to_string()),
    ];
    counter!("resilience_store_faults_total", &labels).increment(1);
}
