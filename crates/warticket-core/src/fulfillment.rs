//! Payment signals and the fulfillment job message.

use serde::{Deserialize, Serialize};

use crate::{BookingCode, OrderStatus};

/// Name of the durable queue carrying fulfillment jobs.
pub const FULFILLMENT_QUEUE: &str = "ticket_generation";

/// Gateway payment statuses that count as a confirmed payment.
pub const PAID_SIGNALS: [&str; 2] = ["PAID", "SETTLEMENT"];

/// Whether a gateway `payment_status` confirms payment.
#[must_use]
pub fn is_paid_signal(payment_status: &str) -> bool {
    PAID_SIGNALS.contains(&payment_status)
}

/// Work item asking the fulfillment worker to produce the tickets of an order.
///
/// Wire format: `{"booking_id": "...", "status": "PAID"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentJob {
    /// Booking code of the paid order.
    pub booking_id: BookingCode,
    /// Order status at enqueue time.
    pub status: OrderStatus,
}

impl FulfillmentJob {
    /// Job for an order that was just marked PAID.
    #[must_use]
    pub fn paid(booking_id: BookingCode) -> Self {
        Self {
            booking_id,
            status: OrderStatus::Paid,
        }
    }

    /// Encode as the JSON message body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a JSON message body.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a well-formed job.
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}
