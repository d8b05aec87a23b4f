//! Error types for war-ticket storage backends.

use warticket_core::TicketError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage, cache, queue and blob operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity type (e.g., "event", "order").
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// A stock update would take `available_stock` outside `0..=total_stock`.
    #[error("insufficient stock for event {event_id}")]
    InsufficientStock {
        /// The event whose stock was exhausted.
        event_id: String,
    },

    /// A unique constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Counter cache operation failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// Message queue operation failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// Blob store operation failed.
    #[error("blob error: {0}")]
    Blob(String),

    /// HMAC signing failed.
    #[error("signing error: {0}")]
    Signing(String),
}

impl From<StoreError> for TicketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound {
                entity: "event",
                id,
            } => Self::EventNotFound { event_id: id },
            StoreError::NotFound {
                entity: "order",
                id,
            } => Self::OrderNotFound { booking_id: id },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
