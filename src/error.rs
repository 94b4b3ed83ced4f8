//! Error types for a3s-event-store

use thiserror::Error;

/// Errors that can occur while publishing or consuming stored events
#[derive(Debug, Error)]
pub enum EventError {
    /// Backing store unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backing store rejected the credential or permission context
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Backing store is shedding load
    #[error("Write to table '{table}' throttled: {reason}")]
    Throttled {
        table: String,
        reason: String,
    },

    /// Backing store rejected the insert
    #[error("Failed to write event to table '{table}': {reason}")]
    Write {
        table: String,
        reason: String,
    },

    /// Timeout waiting for the backing store
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Producer payload uses a field name the store owns
    #[error("Event payload uses reserved field '{field}'")]
    ReservedField {
        field: String,
    },

    /// Producer payload is not a field mapping
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    /// String is not a valid event identifier
    #[error("Invalid event id '{id}': {reason}")]
    InvalidId {
        id: String,
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Change feed creation or consumption failure
    #[error("Change feed error: {0}")]
    ChangeFeed(String),

    /// Stream/table creation or management error
    #[error("Stream error: {0}")]
    Stream(String),
}

impl EventError {
    /// Whether a caller may reasonably retry the failed operation
    ///
    /// The store never retries on its own; this only classifies the failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventError::Connection(_) | EventError::Throttled { .. } | EventError::Timeout(_)
        )
    }
}

/// Result type alias for event store operations
pub type Result<T> = std::result::Result<T, EventError>;
