//! Error types for the messenger.

use thiserror::Error;

/// Error returned by a message handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for messenger operations.
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid message type {type_name}: {reason}")]
    InvalidMessageType {
        type_name: &'static str,
        reason: String,
    },

    #[error("Subscription limit reached ({limit})")]
    CapacityExceeded { limit: usize },

    #[error("Handler for {message_type} on {recipient_type} failed: {source}")]
    Handler {
        message_type: &'static str,
        recipient_type: &'static str,
        #[source]
        source: HandlerError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Property not found on {type_name}: {property}")]
    UnknownProperty {
        type_name: &'static str,
        property: String,
    },
}

impl From<serde_json::Error> for MessengerError {
    fn from(e: serde_json::Error) -> Self {
        MessengerError::Config(e.to_string())
    }
}

/// Result type for messenger operations.
pub type Result<T> = std::result::Result<T, MessengerError>;
