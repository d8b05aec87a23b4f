//! Order types and the order status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BookingCode, Event, EventId, OrderId, Ticket, TicketError, UserId};

/// Lifecycle status of an order.
///
/// Progression is monotonic: a status never moves back to an earlier one.
/// `COMPLETED` and `FAILED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Stock reserved, awaiting payment.
    Pending,
    /// Payment confirmed, tickets not yet produced.
    Paid,
    /// Tickets being produced.
    Processing,
    /// Every seat has a persisted ticket.
    Completed,
    /// Fulfillment gave up on this order.
    Failed,
}

impl OrderStatus {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal forward transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid)
                | (Self::Paid, Self::Processing | Self::Completed | Self::Failed)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }

    /// Check a transition, returning `InvalidTransition` when it would regress.
    ///
    /// # Errors
    ///
    /// Returns `TicketError::InvalidTransition` if `next` is not reachable from `self`.
    pub fn ensure_transition(&self, next: Self) -> Result<(), TicketError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TicketError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// A purchase of `quantity` seats of one event by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Internal identity.
    pub id: OrderId,

    /// Human-facing unique code.
    pub booking_id: BookingCode,

    /// Owner of the order.
    pub user_id: UserId,

    /// The event the seats belong to.
    pub event_id: EventId,

    /// Seats purchased (always > 0).
    pub quantity: u32,

    /// Current lifecycle status.
    pub status: OrderStatus,

    /// When the order was placed.
    pub created_at: DateTime<Utc>,

    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new PENDING order with a fresh booking code.
    ///
    /// # Errors
    ///
    /// Returns `TicketError::InvalidQuantity` if `quantity` is zero.
    pub fn new_pending(user_id: UserId, event_id: EventId, quantity: u32) -> Result<Self, TicketError> {
        if quantity == 0 {
            return Err(TicketError::InvalidQuantity(quantity));
        }

        let now = Utc::now();
        Ok(Self {
            id: OrderId::generate(),
            booking_id: BookingCode::generate(&user_id),
            user_id,
            event_id,
            quantity,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }
}

/// An order together with its event and the tickets produced so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    /// The order row.
    pub order: Order,
    /// Snapshot of the ordered event.
    pub event: Event,
    /// Tickets persisted for the order.
    pub tickets: Vec<Ticket>,
}
