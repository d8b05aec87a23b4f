//! Storage layer for the war-ticket service.
//!
//! This crate provides the collaborators the ordering pipeline is built on, each
//! behind a narrow trait so it can be injected and replaced in tests:
//!
//! - [`Store`]: durable store for events, orders and tickets (`PgStore`, `RocksStore`, `MemoryStore`)
//! - [`CounterCache`]: atomic counters backing the stock ledger (`RedisCache`, `MemoryCache`)
//! - [`JobQueue`]: at-least-once work queue (`RedisQueue`, `MemoryQueue`)
//! - [`BlobStore`]: artifact storage with signed URLs (`FsBlobStore`, `MemoryBlobStore`)
//! - [`RateLimiter`]: sliding-window request limits (`RedisRateLimiter`, `MemoryRateLimiter`)
//!
//! # Example
//!
//! ```no_run
//! use warticket_store::{MemoryStore, Store};
//! use warticket_core::{Event, Order, UserId};
//!
//! # async fn example() -> warticket_store::Result<()> {
//! let store = MemoryStore::new();
//!
//! let event = Event::new("Concert", "Main Hall", chrono::Utc::now(), 15_000, 100);
//! store.put_event(&event).await?;
//!
//! let order = Order::new_pending(UserId::generate(), event.id, 2).unwrap();
//! let snapshot = store.create_order(&order).await?;
//! assert_eq!(snapshot.available_stock, 98);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod blob;
pub mod cache;
pub mod crypto;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod queue;
pub mod ratelimit;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use blob::{Blob, BlobStore, FsBlobStore, MemoryBlobStore, UrlSigner};
pub use cache::{CounterCache, MemoryCache, RedisCache};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use queue::{
    DeadLetter, Delivery, JobQueue, MemoryQueue, OutgoingMessage, RedisQueue, JSON_CONTENT_TYPE,
};
pub use ratelimit::{MemoryRateLimiter, RateDecision, RateLimiter, RedisRateLimiter};
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use warticket_core::{
    BookingCode, Event, EventId, Order, OrderDetails, OrderId, OrderStatus, Ticket, UserId,
};

/// The durable store trait defining all database operations.
///
/// This trait abstracts the relational store, allowing for different implementations
/// (e.g., `PostgreSQL`, `RocksDB`, in-memory for testing).
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Event Operations
    // =========================================================================

    /// Insert or replace an event record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_event(&self, event: &Event) -> Result<()>;

    /// Get an event by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_event(&self, event_id: &EventId) -> Result<Option<Event>>;

    // =========================================================================
    // Order Operations
    // =========================================================================

    /// Insert a PENDING order and take its seats from the event, in one transaction.
    ///
    /// The stock update is conditional on the event row still existing; the
    /// post-commit event snapshot is returned.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the event row is gone (zero rows affected).
    /// - `StoreError::InsufficientStock` if the update would make `available_stock` negative.
    /// - `StoreError::Conflict` if the booking code is already taken.
    async fn create_order(&self, order: &Order) -> Result<Event>;

    /// Get an order, its event and its tickets by booking code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_order_by_booking(&self, booking_id: &BookingCode) -> Result<Option<OrderDetails>>;

    /// List a user's orders with their events and tickets, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_orders_by_user(&self, user_id: &UserId) -> Result<Vec<OrderDetails>>;

    /// Move an order from `from` to `to`, only if it is currently in `from`.
    ///
    /// Returns `true` when the row was updated, `false` when the order was in a
    /// different status.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if no order has this booking code.
    /// - `StoreError::Database` if `from -> to` is not a forward transition.
    async fn transition_order_status(
        &self,
        booking_id: &BookingCode,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool>;

    // =========================================================================
    // Ticket Operations
    // =========================================================================

    /// Insert a ticket row.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the ticket number is already taken.
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()>;

    /// List the tickets of an order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_tickets_for_order(&self, order_id: &OrderId) -> Result<Vec<Ticket>>;
}

/// Reject transitions that would move an order status backwards.
pub(crate) fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<()> {
    from.ensure_transition(to)
        .map_err(|e| StoreError::Database(e.to_string()))
}
