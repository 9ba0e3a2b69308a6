//! Error types for the anno-relay crate.

use anno_store::StoreError;
use thiserror::Error;

/// Errors talking to the annotation source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The request could not be sent or the response could not be read.
    #[error("source request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The source answered with a non-success status.
    #[error("source returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response body was not what the API documents.
    #[error("invalid source response: {0}")]
    Decode(String),

    /// The client could not be built from its configuration.
    #[error("invalid source configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors delivering a message to a recipient.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the response could not be read.
    #[error("transport request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The chat API refused the call.
    #[error("chat api error {code}: {description}")]
    Api {
        /// Error code reported by the API.
        code: i64,
        /// Human-readable description reported by the API.
        description: String,
    },

    /// The response body was not what the API documents.
    #[error("invalid transport response: {0}")]
    Decode(String),

    /// Delivery to one recipient was rejected.
    #[error("delivery to chat {chat_id} rejected: {reason}")]
    Rejected {
        /// The recipient chat.
        chat_id: i64,
        /// Why delivery was rejected.
        reason: String,
    },

    /// The client could not be built from its configuration.
    #[error("invalid transport configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors parsing a message template.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// The template names a placeholder that has no value.
    #[error("unknown placeholder '{name}' at byte {offset}")]
    UnknownPlaceholder {
        /// The placeholder name as written.
        name: String,
        /// Byte offset of the opening braces.
        offset: usize,
    },

    /// A `{{` has no matching `}}`.
    #[error("unterminated placeholder at byte {offset}")]
    Unterminated {
        /// Byte offset of the opening braces.
        offset: usize,
    },

    /// The template file could not be read.
    #[error("cannot read template {path}: {reason}")]
    Read {
        /// Template file path.
        path: String,
        /// The underlying IO error.
        reason: String,
    },
}

/// Errors surfaced by the relay's long-running tasks.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Invalid or missing settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Annotation source failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Chat transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Message template failure.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Subscription store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The event queue closed while a task still needed it.
    #[error("event queue closed")]
    QueueClosed,

    /// A supervised task panicked.
    #[error("task '{task}' panicked: {reason}")]
    TaskPanicked {
        /// Name of the task.
        task: String,
        /// Panic payload, if it was a string.
        reason: String,
    },
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_source_status() {
        let err = SourceError::Status {
            status: 401,
            body: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "source returned status 401: unauthorized");
    }

    #[test]
    fn error_display_transport_api() {
        let err = TransportError::Api {
            code: 403,
            description: "Forbidden: bot was kicked".to_string(),
        };
        assert_eq!(err.to_string(), "chat api error 403: Forbidden: bot was kicked");
    }

    #[test]
    fn error_display_template_unknown_placeholder() {
        let err = TemplateError::UnknownPlaceholder {
            name: "Title".to_string(),
            offset: 4,
        };
        assert_eq!(err.to_string(), "unknown placeholder 'Title' at byte 4");
    }

    #[test]
    fn error_display_task_panicked() {
        let err = RelayError::TaskPanicked {
            task: "scraper".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "task 'scraper' panicked: boom");
    }

    #[test]
    fn relay_error_is_transparent_over_sources() {
        let err: RelayError = SourceError::Decode("not an array".to_string()).into();
        assert_eq!(err.to_string(), "invalid source response: not an array");
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        let err: SourceError = json_err.into();
        assert!(matches!(err, SourceError::Decode(_)));
    }
}
