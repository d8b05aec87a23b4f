//! Event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EventId;

/// A ticketed event with a fixed inventory.
///
/// The durable store owns `available_stock`; the stock ledger keeps a cached mirror of
/// it keyed by event identity. `0 <= available_stock <= total_stock` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The event ID.
    pub id: EventId,

    /// Display name.
    pub name: String,

    /// Venue / address.
    pub location: String,

    /// When the event starts.
    pub date: DateTime<Utc>,

    /// Price per seat in cents.
    pub price_cents: i64,

    /// Free-text description.
    pub description: Option<String>,

    /// Blob-store key of the event image, if any.
    pub image: Option<String>,

    /// Seats ever sold for this event. Immutable once set.
    pub total_stock: u32,

    /// Seats not yet committed to an order.
    pub available_stock: u32,

    /// When the event was created.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Create a new event with all seats available.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        date: DateTime<Utc>,
        price_cents: i64,
        total_stock: u32,
    ) -> Self {
        Self {
            id: EventId::generate(),
            name: name.into(),
            location: location.into(),
            date,
            price_cents,
            description: None,
            image: None,
            total_stock,
            available_stock: total_stock,
            created_at: Utc::now(),
        }
    }

    /// Attach a blob-store image key.
    #[must_use]
    pub fn with_image(mut self, key: impl Into<String>) -> Self {
        self.image = Some(key.into());
        self
    }

    /// Whether `quantity` more seats can be committed durably.
    #[must_use]
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.available_stock >= quantity
    }

    /// Seats committed so far.
    #[must_use]
    pub fn sold(&self) -> u32 {
        self.total_stock - self.available_stock
    }

    /// Total price for `quantity` seats, in cents.
    #[must_use]
    pub fn total_for(&self, quantity: u32) -> i64 {
        self.price_cents * i64::from(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_has_full_stock() {
        let event = Event::new("Gig", "Hall A", Utc::now(), 15_000, 100);
        assert_eq!(event.available_stock, 100);
        assert_eq!(event.sold(), 0);
        assert!(event.has_stock_for(100));
        assert!(!event.has_stock_for(101));
    }

    #[test]
    fn total_multiplies_price() {
        let event = Event::new("Gig", "Hall A", Utc::now(), 15_000, 10);
        assert_eq!(event.total_for(3), 45_000);
    }
}
