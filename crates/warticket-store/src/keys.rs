//! Key encoding utilities for `RocksDB`.
//!
//! Index keys are `parent (16 bytes) || timestamp (8 bytes) || child (16 bytes)`, so a
//! prefix scan over the parent yields children in creation order.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use warticket_core::{BookingCode, EventId, OrderId, TicketId, TicketNumber, UserId};

/// Length of a composite index key.
pub const INDEX_KEY_LEN: usize = 40;

/// Create an event key from an event ID.
#[must_use]
pub fn event_key(event_id: &EventId) -> Vec<u8> {
    event_id.as_bytes().to_vec()
}

/// Create an order key from an order ID.
#[must_use]
pub fn order_key(order_id: &OrderId) -> Vec<u8> {
    order_id.as_bytes().to_vec()
}

/// Create a booking index key.
#[must_use]
pub fn booking_key(booking_id: &BookingCode) -> Vec<u8> {
    booking_id.as_str().as_bytes().to_vec()
}

/// Create a ticket key from a ticket ID.
#[must_use]
pub fn ticket_key(ticket_id: &TicketId) -> Vec<u8> {
    ticket_id.as_bytes().to_vec()
}

/// Create a ticket-number index key.
#[must_use]
pub fn ticket_number_key(ticket_number: &TicketNumber) -> Vec<u8> {
    ticket_number.as_str().as_bytes().to_vec()
}

/// Create a user-order index key.
#[must_use]
pub fn user_order_key(user_id: &UserId, created_at: DateTime<Utc>, order_id: &OrderId) -> Vec<u8> {
    index_key(user_id.as_bytes(), created_at, order_id.as_bytes())
}

/// Create an order-ticket index key.
#[must_use]
pub fn order_ticket_key(order_id: &OrderId, created_at: DateTime<Utc>, ticket_id: &TicketId) -> Vec<u8> {
    index_key(order_id.as_bytes(), created_at, ticket_id.as_bytes())
}

/// Create a prefix for iterating an index by its parent ID.
#[must_use]
pub fn parent_prefix(parent: &[u8; 16]) -> Vec<u8> {
    parent.to_vec()
}

/// Extract the child ID from a composite index key.
///
/// Returns `None` if the key is not a composite index key.
#[must_use]
pub fn child_id(key: &[u8]) -> Option<Uuid> {
    if key.len() != INDEX_KEY_LEN {
        return None;
    }
    Uuid::from_slice(&key[24..]).ok()
}

/// Decode an ID stored as an index value.
#[must_use]
pub fn id_from_value(value: &[u8]) -> Option<Uuid> {
    Uuid::from_slice(value).ok()
}

fn index_key(parent: &[u8; 16], created_at: DateTime<Utc>, child: &[u8; 16]) -> Vec<u8> {
    let mut key = Vec::with_capacity(INDEX_KEY_LEN);
    key.extend_from_slice(parent);
    key.extend_from_slice(&sortable_timestamp(created_at));
    key.extend_from_slice(child);
    key
}

/// Big-endian timestamp with the sign bit flipped, so byte order matches time order.
#[allow(clippy::cast_sign_loss)]
fn sortable_timestamp(at: DateTime<Utc>) -> [u8; 8] {
    ((at.timestamp_micros() as u64) ^ (1 << 63)).to_be_bytes()
}
