use crate::circuit_breaker::types::{CircuitBreakerConfig, RetryConfig};
use crate::error::{ResilienceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main resilience configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Shared state backend
    #[serde(default)]
    pub store: StoreConfig,
    /// Circuit breaker settings, applied to every dependency
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Shared state backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local store; breakers are shared between tasks only
    #[default]
    Memory,
    /// Redis store shared between processes
    Redis {
        /// Redis connection URL
        url: String,
    },
}

impl ResilienceConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ResilienceError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let StoreConfig::Redis { url } = &self.store {
            if url.is_empty() {
                return Err(ResilienceError::Config(
                    "Redis URL cannot be empty".to_string(),
                ));
            }
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(ResilienceError::Config(format!(
                    "Redis URL must start with redis:// or rediss://: {}",
                    url
                )));
            }
        }

        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 {
            return Err(ResilienceError::Config(
                "Circuit breaker failure_threshold must be > 0".to_string(),
            ));
        }
        if cb.success_threshold == 0 {
            return Err(ResilienceError::Config(
                "Circuit breaker success_threshold must be > 0".to_string(),
            ));
        }
        if cb.recovery_timeout_secs == 0 {
            return Err(ResilienceError::Config(
                "Circuit breaker recovery_timeout_secs must be > 0".to_string(),
            ));
        }
        if cb.state_ttl_secs == 0 {
            return Err(ResilienceError::Config(
                "Circuit breaker state_ttl_secs must be > 0".to_string(),
            ));
        }
        if cb.max_update_attempts == 0 {
            return Err(ResilienceError::Config(
                "Circuit breaker max_update_attempts must be > 0".to_string(),
            ));
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(ResilienceError::Config(
                "Retry max_attempts must be > 0".to_string(),
            ));
        }
        if retry.base_delay_ms == 0 {
            return Err(ResilienceError::Config(
                "Retry base_delay_ms must be > 0".to_string(),
            ));
        }
        if retry.backoff_multiplier.is_nan() || retry.backoff_multiplier < 1.0 {
            return Err(ResilienceError::Config(format!(
                "Retry backoff_multiplier must be >= 1.0, got {}",
                retry.backoff_multiplier
            )));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            return Err(ResilienceError::Config(format!(
                "Retry max_delay_ms ({}) must be >= base_delay_ms ({})",
                retry.max_delay_ms, retry.base_delay_ms
            )));
        }

        Ok(())
    }
}
