//! Common error types and classification for phasegate
//!
//! The error handling system is built on three pieces:
//!
//! 1. **`CommonError`**: error patterns shared by every module (invalid
//!    configuration, serialization, lock timeouts, cancelled tasks).
//!
//! 2. **`ErrorClassification` trait**: a standard interface for classifying
//!    errors by retryability and severity.
//!
//! 3. **`ErrorSeverity` enum**: the severity levels used for logging.
//!
//! Module errors compose with `CommonError` instead of duplicating it:
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum LifecycleError {
//!     #[error("object is not running")]
//!     NotRunning,
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//!
//! impl_error_classification!(LifecycleError, Common,
//!     Self::NotRunning => {
//!         retryable: true,
//!         severity: ErrorSeverity::Warning,
//!         critical: false,
//!     }
//! );
//! ```

use std::fmt;
use std::time::Duration;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Error variants shared across modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Configuration-related errors
    Config { message: String, field: Option<String> },

    /// Serialization or deserialization errors
    Serialization { message: String, format: Option<String> },

    /// Timed out waiting for an operation (e.g. a lock acquisition)
    Timeout { operation: String, duration: Duration },

    /// Task cancellation (async)
    TaskCancelled { task_id: String, reason: Option<String> },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => {
                if let Some(field) = field {
                    write!(f, "Configuration error in field '{}': {}", field, message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            Self::Serialization { message, format } => {
                if let Some(format) = format {
                    write!(f, "Serialization error ({}): {}", format, message)
                } else {
                    write!(f, "Serialization error: {}", message)
                }
            }
            Self::Timeout { operation, duration } => {
                write!(f, "Operation '{}' timed out after {:?}", operation, duration)
            }
            Self::TaskCancelled { task_id, reason } => {
                if let Some(reason) = reason {
                    write!(f, "Task '{}' cancelled: {}", task_id, reason)
                } else {
                    write!(f, "Task '{}' cancelled", task_id)
                }
            }
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. } => ErrorSeverity::Error,
            Self::Serialization { .. } => ErrorSeverity::Error,
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::TaskCancelled { .. } => ErrorSeverity::Info,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl CommonError {
    /// Create a configuration error for a specific field
    pub fn config_field<S: Into<String>, F: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create a serialization error with format information
    pub fn serialization_format<S: Into<String>, F: Into<String>>(format: F, message: S) -> Self {
        Self::Serialization { message: message.into(), format: Some(format.into()) }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    /// Create a task cancellation error with reason
    pub fn task_cancelled_with_reason<S: Into<String>, R: Into<String>>(
        task_id: S,
        reason: R,
    ) -> Self {
        Self::TaskCancelled { task_id: task_id.into(), reason: Some(reason.into()) }
    }

    /// Convert error to structured logging fields
    ///
    /// ```rust,ignore
    /// let err = CommonError::config_field("event_capacity", "must be positive");
    /// let fields = err.as_tracing_fields();
    /// tracing::warn!(error_type = %fields[0].1, "rejected gate configuration");
    /// ```
    pub fn as_tracing_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("error_type", self.error_type_name().to_string())];

        match self {
            Self::Config { message, field } => {
                fields.push(("message", message.clone()));
                if let Some(field) = field {
                    fields.push(("field", field.clone()));
                }
            }
            Self::Serialization { message, format } => {
                fields.push(("message", message.clone()));
                if let Some(format) = format {
                    fields.push(("format", format.clone()));
                }
            }
            Self::Timeout { operation, duration } => {
                fields.push(("operation", operation.clone()));
                fields.push(("duration_ms", duration.as_millis().to_string()));
            }
            Self::TaskCancelled { task_id, reason } => {
                fields.push(("task_id", task_id.clone()));
                if let Some(reason) = reason {
                    fields.push(("reason", reason.clone()));
                }
            }
        }

        fields
    }

    fn error_type_name(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Serialization { .. } => "serialization",
            Self::Timeout { .. } => "timeout",
            Self::TaskCancelled { .. } => "task_cancelled",
        }
    }
}

/// Error classification trait for consistent handling across modules
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// For lifecycle errors this answers "could the same call succeed later
    /// without anyone changing the call site", e.g. a guarded method called
    /// before `start()` finished.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl From<toml::de::Error> for CommonError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization_format("TOML", err.to_string())
    }
}

/// Macro to implement ErrorClassification by delegating to CommonError
///
/// ```rust,ignore
/// impl_error_classification!(MyError, Common,
///     Self::Specific(_) => {
///         retryable: false,
///         severity: ErrorSeverity::Error,
///         critical: false,
///     }
/// );
/// ```
#[macro_export]
macro_rules! impl_error_classification {
    (
        $error_type:ty,
        $common_variant:ident
        $(,
            $variant:pat => {
                retryable: $retryable:expr,
                severity: $severity:expr,
                critical: $critical:expr
                $(, retry_after: $retry_after:expr)?
                $(,)?
            }
        )*
        $(,)?
    ) => {
        impl $crate::error::ErrorClassification for $error_type {
            fn is_retryable(&self) -> bool {
                match self {
                    Self::$common_variant(e) => e.is_retryable(),
                    $(
                        $variant => $retryable,
                    )*
                }
            }

            fn severity(&self) -> $crate::error::ErrorSeverity {
                match self {
                    Self::$common_variant(e) => e.severity(),
                    $(
                        $variant => $severity,
                    )*
                }
            }

            fn is_critical(&self) -> bool {
                match self {
                    Self::$common_variant(e) => e.is_critical(),
                    $(
                        $variant => $critical,
                    )*
                }
            }

            fn retry_after(&self) -> Option<std::time::Duration> {
                match self {
                    Self::$common_variant(e) => e.retry_after(),
                    $(
                        $(
                            $variant => $retry_after,
                        )?
                    )*
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    //! Unit tests for shared error handling
    //!
    //! Tests cover display formatting, classification, structured logging
    //! fields and conversions.

    use super::*;

    /// Validates `CommonError::config_field` display and classification.
    ///
    /// Assertions:
    /// - Confirms `err.to_string()` names the field.
    /// - Ensures `!err.is_retryable()` evaluates to true.
    /// - Confirms `err.severity()` equals `ErrorSeverity::Error`.
    #[test]
    fn test_error_config_with_field() {
        let err = CommonError::config_field("event_capacity", "must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error in field 'event_capacity': must be positive"
        );
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }

    /// Validates `CommonError::timeout` behavior.
    ///
    /// Assertions:
    /// - Confirms the operation and duration are part of the message.
    /// - Ensures timeouts are retryable warnings.
    #[test]
    fn test_error_timeout() {
        let err = CommonError::timeout("write_lock_db", Duration::from_millis(50));
        assert_eq!(err.to_string(), "Operation 'write_lock_db' timed out after 50ms");
        assert!(err.is_retryable());
        assert!(!err.is_critical());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_error_task_cancelled() {
        let err = CommonError::task_cancelled_with_reason("destroy", "runtime shutdown");
        assert_eq!(err.to_string(), "Task 'destroy' cancelled: runtime shutdown");
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert!(!err.is_critical());
    }

    /// Validates `as_tracing_fields` for a config error.
    ///
    /// Assertions:
    /// - Confirms the first field is the error type.
    /// - Confirms the optional field name is included.
    #[test]
    fn test_as_tracing_fields_config() {
        let err = CommonError::config_field("name", "must not be empty");
        let fields = err.as_tracing_fields();
        assert_eq!(fields[0], ("error_type", "config".to_string()));
        assert!(fields.contains(&("field", "name".to_string())));
        assert!(fields.contains(&("message", "must not be empty".to_string())));
    }

    #[test]
    fn test_from_toml_error() {
        let parsed: Result<toml::Table, _> = toml::from_str("name = ");
        let err = CommonError::from(parsed.unwrap_err());
        assert!(matches!(err, CommonError::Serialization { format: Some(ref f), .. } if f == "TOML"));
    }

    #[test]
    fn test_severity_ordering_and_display() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
        assert_eq!(ErrorSeverity::Critical.to_string(), "CRITICAL");
    }
}
