//! Error types for the war-ticket domain.

use crate::ids::IdError;
use crate::{EventId, OrderStatus};

/// Result type for war-ticket operations.
pub type Result<T> = std::result::Result<T, TicketError>;

/// Errors that can occur in ordering, payment confirmation and fulfillment.
///
/// `NotEnoughStock`, the not-found variants and the input variants are
/// caller-correctable; `Internal` wraps any unexpected collaborator failure and is
/// reported to callers without its cause.
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    /// The event has fewer seats left than requested.
    #[error("not enough stock for event {event_id}: requested {requested}")]
    NotEnoughStock {
        /// The event that is sold out (or nearly so).
        event_id: EventId,
        /// Seats requested by the caller.
        requested: u32,
    },

    /// Event not found.
    #[error("event not found: {event_id}")]
    EventNotFound {
        /// The event ID that was not found.
        event_id: String,
    },

    /// Order not found.
    #[error("order not found: {booking_id}")]
    OrderNotFound {
        /// The booking code that was not found.
        booking_id: String,
    },

    /// Requested quantity is out of range.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// Order status may only move forward.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// The current status.
        from: OrderStatus,
        /// The rejected target status.
        to: OrderStatus,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Unexpected collaborator failure (store, cache, queue, blob store, renderer).
    #[error("internal error: {0}")]
    Internal(String),
}

impl TicketError {
    /// Shorthand for wrapping a collaborator failure.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}
