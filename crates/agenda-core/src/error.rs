//! Error types for the contacts agenda core.
//!
//! Every component returns [`AgendaError`]; the HTTP layer maps it to a status
//! code through [`AgendaError::status_code`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the agenda core.
#[derive(Debug, Error)]
pub enum AgendaError {
    // Repository errors
    #[error("Contact not found: {id}")]
    NotFound { id: i64 },

    #[error("Contact already exists: {id}")]
    Conflict { id: i64 },

    #[error("Contact store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // Resilience errors
    #[error("Circuit breaker open for {name}")]
    CircuitOpen { name: String },

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    // Cache errors
    #[error("Cache unavailable: {message}")]
    CacheUnavailable { message: String },

    // Upstream errors
    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("{0}")]
    ServiceUnavailable(String),

    // Input and configuration errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for agenda operations.
pub type Result<T> = std::result::Result<T, AgendaError>;

impl From<std::io::Error> for AgendaError {
    fn from(err: std::io::Error) -> Self {
        AgendaError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for AgendaError {
    fn from(err: serde_json::Error) -> Self {
        AgendaError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for AgendaError {
    fn from(err: rusqlite::Error) -> Self {
        AgendaError::StoreUnavailable {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for AgendaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AgendaError::Timeout(Duration::from_secs(0))
        } else {
            AgendaError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl AgendaError {
    /// Create a store error without an underlying driver error.
    pub fn store(message: impl Into<String>) -> Self {
        AgendaError::StoreUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a validation error for a field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AgendaError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        AgendaError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// HTTP status code for this error.
    ///
    /// - 400: validation
    /// - 404: contact not found
    /// - 409: duplicate contact id
    /// - 502: upstream answered with an error or could not be reached
    /// - 503: circuit open, store down, or no fallback data
    /// - 504: call timed out
    /// - 500: everything else
    pub fn status_code(&self) -> u16 {
        match self {
            AgendaError::Validation { .. } => 400,
            AgendaError::NotFound { .. } => 404,
            AgendaError::Conflict { .. } => 409,
            AgendaError::Upstream { .. } | AgendaError::Network { .. } => 502,
            AgendaError::CircuitOpen { .. }
            | AgendaError::StoreUnavailable { .. }
            | AgendaError::ServiceUnavailable(_) => 503,
            AgendaError::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// Check if this error should trigger a retry.
    ///
    /// Upstream 4xx responses are final except for 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgendaError::StoreUnavailable { .. }
            | AgendaError::Network { .. }
            | AgendaError::Timeout(_) => true,
            AgendaError::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether this error means the dependency itself is failing.
    ///
    /// Business outcomes like a missing or duplicate contact prove the
    /// dependency answered and must not count against the circuit breaker.
    pub fn is_dependency_failure(&self) -> bool {
        match self {
            AgendaError::Upstream { status, .. } => *status >= 500 || *status == 429,
            AgendaError::StoreUnavailable { .. }
            | AgendaError::Network { .. }
            | AgendaError::Timeout(_)
            | AgendaError::Json { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgendaError::NotFound { id: 42 };
        assert_eq!(err.to_string(), "Contact not found: 42");

        let err = AgendaError::CircuitOpen {
            name: "contact-store".into(),
        };
        assert_eq!(err.to_string(), "Circuit breaker open for contact-store");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AgendaError::NotFound { id: 1 }.status_code(), 404);
        assert_eq!(AgendaError::Conflict { id: 1 }.status_code(), 409);
        assert_eq!(AgendaError::store("down").status_code(), 503);
        assert_eq!(
            AgendaError::ServiceUnavailable("no data".into()).status_code(),
            503
        );
        assert_eq!(AgendaError::Timeout(Duration::from_secs(1)).status_code(), 504);
        assert_eq!(
            AgendaError::Config {
                message: "bad".into()
            }
            .status_code(),
            500
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(AgendaError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(AgendaError::store("connection reset").is_retryable());
        assert!(AgendaError::Upstream {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(AgendaError::Upstream {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!AgendaError::Upstream {
            status: 404,
            message: "gone".into()
        }
        .is_retryable());
        assert!(!AgendaError::NotFound { id: 7 }.is_retryable());
        assert!(!AgendaError::Conflict { id: 7 }.is_retryable());
    }

    #[test]
    fn test_business_errors_are_not_dependency_failures() {
        assert!(!AgendaError::NotFound { id: 1 }.is_dependency_failure());
        assert!(!AgendaError::Conflict { id: 1 }.is_dependency_failure());
        assert!(AgendaError::store("down").is_dependency_failure());
    }
}
