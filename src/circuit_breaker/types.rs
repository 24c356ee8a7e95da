use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    /// Calls flow normally
    #[default]
    Closed,
    /// Calls are rejected until `open_until`
    Open,
    /// Trial calls are allowed to probe recovery
    HalfOpen,
}

impl CircuitStatus {
    /// Wire representation, shared by the store and the status projection
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
            CircuitStatus::HalfOpen => "half_open",
        }
    }

    /// Numeric encoding used by the state gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            CircuitStatus::Closed => 0,
            CircuitStatus::Open => 1,
            CircuitStatus::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CircuitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closed" => Ok(CircuitStatus::Closed),
            "open" => Ok(CircuitStatus::Open),
            "half_open" => Ok(CircuitStatus::HalfOpen),
            other => Err(format!("unknown circuit status '{}'", other)),
        }
    }
}

/// Persisted state of one breaker identity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CircuitState {
    pub status: CircuitStatus,
    /// Cumulative failures; never reset by the Open -> HalfOpen transition
    pub failures: u32,
    /// Successes observed since entering HalfOpen
    pub consecutive_successes: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub open_until: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, 0 when the record is absent from the store
    #[serde(default)]
    pub version: u64,
}

impl CircuitState {
    /// Whether calls are blocked at `now`.
    ///
    /// An Open record without `open_until` counts as expired.
    pub fn blocks_at(&self, now: DateTime<Utc>) -> bool {
        self.status == CircuitStatus::Open && self.open_until.map_or(false, |until| now < until)
    }

    /// Project the state for health and monitoring consumers
    pub fn snapshot(&self, dependency: &str, now: DateTime<Utc>) -> CircuitSnapshot {
        CircuitSnapshot {
            dependency: dependency.to_string(),
            status: self.status,
            failures: self.failures,
            consecutive_successes: self.consecutive_successes,
            is_blocked: self.blocks_at(now),
            last_failure: self.last_failure.map(format_timestamp),
            open_until: self.open_until.map(format_timestamp),
        }
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read-only status projection of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub dependency: String,
    pub status: CircuitStatus,
    pub failures: u32,
    pub consecutive_successes: u32,
    pub is_blocked: bool,
    pub last_failure: Option<String>,
    pub open_until: Option<String>,
}

/// How a failure observed while HalfOpen is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalfOpenFailurePolicy {
    /// Count the failure towards the cumulative threshold like any other.
    /// Since the counter is not cleared when the breaker half-opens, a
    /// breaker that tripped on its own reopens on the first trial failure.
    #[default]
    Cumulative,
    /// Any HalfOpen failure reopens the circuit
    ReopenImmediately,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive HalfOpen successes before closing
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Seconds to stay open before a trial is permitted
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,

    /// Expiry of the persisted state record
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,

    #[serde(default)]
    pub half_open_failure_policy: HalfOpenFailurePolicy,

    /// Compare-and-swap rounds before an update gives up
    #[serde(default = "default_max_update_attempts")]
    pub max_update_attempts: u32,

    /// Namespace of the store keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_recovery_timeout_secs() -> u64 {
    300
}

fn default_state_ttl_secs() -> u64 {
    3600
}

fn default_max_update_attempts() -> u32 {
    16
}

fn default_key_prefix() -> String {
    "resilience:circuit".to_string()
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            state_ttl_secs: default_state_ttl_secs(),
            half_open_failure_policy: HalfOpenFailurePolicy::default(),
            max_update_attempts: default_max_update_attempts(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    /// Store key of the breaker named `dependency`
    pub fn key_for(&self, dependency: &str) -> String {
        format!("{}:{}", self.key_prefix, dependency)
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Invocations per logical call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound of a single delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
