//! Error types for the anno-store crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in subscription store operations.
///
/// A missing key is not an error: lookups report it as `Ok(None)` or
/// `Ok(false)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed to carry out the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// The operation did not complete within the store's operation timeout.
    #[error("store operation '{op}' timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        op: &'static str,
        /// The configured operation timeout.
        timeout: Duration,
    },

    /// A stored record could not be encoded or decoded.
    #[error("serialization error for key '{key}': {reason}")]
    Serialization {
        /// The key of the offending record.
        key: String,
        /// The reason decoding failed.
        reason: String,
    },

    /// Invalid store configuration.
    #[error("invalid store configuration: {0}")]
    Config(String),

    /// Embedded database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// HTTP error talking to a networked backend.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true if the error means the backend could not be reached
    /// or did not answer in time.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Http(_) | Self::Backend(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_backend() {
        let err = StoreError::Backend("connection refused".to_string());
        assert_eq!(err.to_string(), "store backend error: connection refused");
    }

    #[test]
    fn error_display_timeout() {
        let err = StoreError::Timeout {
            op: "list",
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "store operation 'list' timed out after 30s");
    }

    #[test]
    fn error_display_serialization() {
        let err = StoreError::Serialization {
            key: "annotationsbot/chats/1".to_string(),
            reason: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "serialization error for key 'annotationsbot/chats/1': expected value"
        );
    }

    #[test]
    fn connectivity_classification() {
        assert!(StoreError::Backend("down".to_string()).is_connectivity());
        assert!(StoreError::Timeout {
            op: "get",
            timeout: Duration::from_secs(1)
        }
        .is_connectivity());
        assert!(!StoreError::Config("bad".to_string()).is_connectivity());
        assert!(!StoreError::Serialization {
            key: "k".to_string(),
            reason: "r".to_string()
        }
        .is_connectivity());
    }
}
