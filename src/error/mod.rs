use thiserror::Error;

/// Result type for resilience setup operations
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Errors raised while configuring or wiring the resilience layer
#[derive(Error, Debug)]
pub enum ResilienceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Faults of the shared state store itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt circuit state under '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Gave up updating '{key}' after {attempts} concurrent modifications")]
    Contention { key: String, attempts: u32 },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Coarse classification of a [`Failure`], for callers that only branch on the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    CircuitOpen,
    ExhaustedRetries,
    StoreFault,
    Cancelled,
}

/// Outcome of a guarded call that did not produce a value
#[derive(Error, Debug)]
pub enum Failure<E> {
    /// The breaker is open; the operation was never invoked
    #[error("Circuit breaker for '{dependency}' is open")]
    CircuitOpen { dependency: String },

    /// Every attempt failed; `last_error` is the final attempt's error
    #[error("Call to '{dependency}' failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        dependency: String,
        last_error: E,
        attempts: u32,
        /// Set when the failure could not be recorded in the shared store
        store_fault: Option<StoreError>,
    },

    /// The shared state store could not be consulted
    #[error("Resilience state store fault: {0}")]
    StoreFault(#[from] StoreError),

    /// The caller cancelled the call while it was backing off
    #[error("Call to '{dependency}' cancelled after {attempts} attempts")]
    Cancelled {
        dependency: String,
        attempts: u32,
        last_error: Option<E>,
    },
}

impl<E> Failure<E> {
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::CircuitOpen { .. } => FailureKind::CircuitOpen,
            Failure::ExhaustedRetries { .. } => FailureKind::ExhaustedRetries,
            Failure::StoreFault(_) => FailureKind::StoreFault,
            Failure::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    /// Number of times the wrapped operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            Failure::CircuitOpen { .. } | Failure::StoreFault(_) => 0,
            Failure::ExhaustedRetries { attempts, .. } | Failure::Cancelled { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Store fault seen during the call, whether or not the operation ran
    pub fn store_fault(&self) -> Option<&StoreError> {
        match self {
            Failure::StoreFault(e) => Some(e),
            Failure::ExhaustedRetries { store_fault, .. } => store_fault.as_ref(),
            _ => None,
        }
    }

    /// The error of the last attempt, if any attempt ran
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Failure::ExhaustedRetries { last_error, .. } => Some(last_error),
            Failure::Cancelled { last_error, .. } => last_error.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let open: Failure<String> = Failure::CircuitOpen {
            dependency: "openai".to_string(),
        };
        assert_eq!(open.kind(), FailureKind::CircuitOpen);
        assert_eq!(open.attempts(), 0);
        assert!(open.last_error().is_none());

        let exhausted = Failure::ExhaustedRetries {
            dependency: "openai".to_string(),
            last_error: "503".to_string(),
            attempts: 5,
            store_fault: None,
        };
        assert_eq!(exhausted.kind(), FailureKind::ExhaustedRetries);
        assert_eq!(exhausted.attempts(), 5);
        assert_eq!(exhausted.last_error(), Some(&"503".to_string()));
        assert!(exhausted.store_fault().is_none());

        let fault: Failure<String> = StoreError::Unavailable("refused".to_string()).into();
        assert_eq!(fault.kind(), FailureKind::StoreFault);
        assert_eq!(
            fault.store_fault(),
            Some(&StoreError::Unavailable("refused".to_string()))
        );
    }

    #[test]
    fn test_error_display() {
        let err: Failure<String> = Failure::ExhaustedRetries {
            dependency: "openai".to_string(),
            last_error: "timeout".to_string(),
            attempts: 3,
            store_fault: Some(StoreError::Unavailable("down".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Call to 'openai' failed after 3 attempts: timeout"
        );

        let err = StoreError::Contention {
            key: "resilience:circuit:openai".to_string(),
            attempts: 16,
        };
        assert_eq!(
            err.to_string(),
            "Gave up updating 'resilience:circuit:openai' after 16 concurrent modifications"
        );
    }

    #[test]
    fn test_store_error_converts_to_resilience_error() {
        let err: ResilienceError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.to_string(), "Store error: State store unavailable: down");
    }
}
