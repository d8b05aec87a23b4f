//! Ticket types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventId, Order, OrderId, TicketId, TicketNumber, UserId};

/// Content type of rendered ticket artifacts.
pub const TICKET_CONTENT_TYPE: &str = "application/pdf";

/// One seat of a paid order, with the location of its rendered artifact.
///
/// Created exactly once per seat by the fulfillment worker and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// The ticket ID.
    pub id: TicketId,
    /// The order this seat belongs to.
    pub order_id: OrderId,
    /// The event of the order.
    pub event_id: EventId,
    /// The owner of the order.
    pub user_id: UserId,
    /// Unique number printed on the ticket.
    pub ticket_number: TicketNumber,
    /// Blob-store key of the rendered artifact.
    pub artifact_key: String,
    /// When the ticket was persisted.
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Build the ticket row for one seat of `order`.
    #[must_use]
    pub fn for_order(order: &Order, ticket_number: TicketNumber) -> Self {
        let artifact_key = Self::artifact_key_for(&ticket_number);
        Self {
            id: TicketId::generate(),
            order_id: order.id,
            event_id: order.event_id,
            user_id: order.user_id,
            ticket_number,
            artifact_key,
            created_at: Utc::now(),
        }
    }

    /// Deterministic blob-store path of a ticket artifact.
    #[must_use]
    pub fn artifact_key_for(ticket_number: &TicketNumber) -> String {
        format!("tickets/{ticket_number}.pdf")
    }
}
