//! Lifecycle error types

use thiserror::Error;

use crate::error::{CommonError, ErrorClassification, ErrorSeverity};
use crate::impl_error_classification;

/// Result type for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors raised by gates and guarded calls
///
/// Hooks and guarded bodies may use their own error type `E` as long as it
/// implements `From<LifecycleError>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// A guarded call was made while the object is not running
    #[error("object is not running")]
    NotRunning,

    /// `destroy` was called while the object is still running
    #[error("object is running")]
    Running,

    /// A guarded call or `start` was made after the object was destroyed
    #[error("object is destroyed")]
    Destroyed,

    /// Shared errors (configuration, lock timeouts, cancelled tasks)
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_classification!(LifecycleError, Common,
    Self::NotRunning => {
        retryable: true,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::Running => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Destroyed => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
);

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Validates `LifecycleError` classification.
    ///
    /// Assertions:
    /// - Ensures only `NotRunning` is retryable among lifecycle variants.
    /// - Ensures `Common` delegates to `CommonError`.
    #[test]
    fn test_classification() {
        assert!(LifecycleError::NotRunning.is_retryable());
        assert_eq!(LifecycleError::NotRunning.severity(), ErrorSeverity::Warning);
        assert!(!LifecycleError::Running.is_retryable());
        assert!(!LifecycleError::Destroyed.is_retryable());
        assert!(!LifecycleError::Destroyed.is_critical());

        let timeout: LifecycleError =
            CommonError::timeout("write_lock_gate", Duration::from_millis(5)).into();
        assert!(timeout.is_retryable());
        assert_eq!(timeout.to_string(), "Operation 'write_lock_gate' timed out after 5ms");
        assert_eq!(timeout.retry_after(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(LifecycleError::NotRunning.to_string(), "object is not running");
        assert_eq!(LifecycleError::Running.to_string(), "object is running");
        assert_eq!(LifecycleError::Destroyed.to_string(), "object is destroyed");
    }
}
