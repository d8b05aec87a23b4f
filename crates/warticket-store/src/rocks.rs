//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait for
//! single-node deployments without `PostgreSQL`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};
use tokio::sync::Mutex;

use warticket_core::{
    BookingCode, Event, EventId, Order, OrderDetails, OrderId, OrderStatus, Ticket, TicketId,
    UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{check_transition, Store};

/// RocksDB-backed storage implementation.
///
/// Read-modify-write operations are serialized by a process-local write lock and
/// committed as one `WriteBatch`.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        self.get_value(cf::ORDERS, &keys::order_key(order_id))
    }

    fn order_id_for_booking(&self, booking_id: &BookingCode) -> Result<Option<OrderId>> {
        let cf = self.cf(cf::ORDERS_BY_BOOKING)?;
        let value = self
            .db
            .get_cf(&cf, keys::booking_key(booking_id))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        value
            .map(|v| {
                keys::id_from_value(&v)
                    .map(OrderId::from_uuid)
                    .ok_or_else(|| StoreError::Serialization(format!("bad booking index entry: {booking_id}")))
            })
            .transpose()
    }

    /// Collect child IDs of an index by parent prefix, in key order.
    fn scan_index(&self, cf_name: &str, parent: &[u8; 16]) -> Result<Vec<uuid::Uuid>> {
        let cf = self.cf(cf_name)?;
        let prefix = keys::parent_prefix(parent);

        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let id = keys::child_id(&key)
                .ok_or_else(|| StoreError::Serialization(format!("bad index key in {cf_name}")))?;
            ids.push(id);
        }

        Ok(ids)
    }

    fn tickets_for_order(&self, order_id: &OrderId) -> Result<Vec<Ticket>> {
        let mut tickets = Vec::new();
        for id in self.scan_index(cf::TICKETS_BY_ORDER, order_id.as_bytes())? {
            if let Some(ticket) = self.get_value(cf::TICKETS, &keys::ticket_key(&TicketId::from_uuid(id)))? {
                tickets.push(ticket);
            }
        }
        Ok(tickets)
    }

    fn details(&self, order: Order) -> Result<OrderDetails> {
        let event: Event = self
            .get_value(cf::EVENTS, &keys::event_key(&order.event_id))?
            .ok_or_else(|| StoreError::NotFound {
                entity: "event",
                id: order.event_id.to_string(),
            })?;
        let tickets = self.tickets_for_order(&order.id)?;

        Ok(OrderDetails {
            order,
            event,
            tickets,
        })
    }
}

#[async_trait]
impl Store for RocksStore {
    // =========================================================================
    // Event Operations
    // =========================================================================

    async fn put_event(&self, event: &Event) -> Result<()> {
        let value = Self::serialize(event)?;

        // Column family handles are not Send; take them only after the last await
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(cf::EVENTS)?;
        self.db
            .put_cf(&cf, keys::event_key(&event.id), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_event(&self, event_id: &EventId) -> Result<Option<Event>> {
        self.get_value(cf::EVENTS, &keys::event_key(event_id))
    }

    // =========================================================================
    // Order Operations
    // =========================================================================

    async fn create_order(&self, order: &Order) -> Result<Event> {
        let _guard = self.write_lock.lock().await;

        if self.order_id_for_booking(&order.booking_id)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "booking code already exists: {}",
                order.booking_id
            )));
        }

        let mut event: Event = self
            .get_value(cf::EVENTS, &keys::event_key(&order.event_id))?
            .ok_or_else(|| StoreError::NotFound {
                entity: "event",
                id: order.event_id.to_string(),
            })?;

        if !event.has_stock_for(order.quantity) {
            return Err(StoreError::InsufficientStock {
                event_id: order.event_id.to_string(),
            });
        }
        event.available_stock -= order.quantity;

        let cf_events = self.cf(cf::EVENTS)?;
        let cf_orders = self.cf(cf::ORDERS)?;
        let cf_by_booking = self.cf(cf::ORDERS_BY_BOOKING)?;
        let cf_by_user = self.cf(cf::ORDERS_BY_USER)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_events, keys::event_key(&event.id), Self::serialize(&event)?);
        batch.put_cf(&cf_orders, keys::order_key(&order.id), Self::serialize(order)?);
        batch.put_cf(&cf_by_booking, keys::booking_key(&order.booking_id), order.id.as_bytes());
        batch.put_cf(
            &cf_by_user,
            keys::user_order_key(&order.user_id, order.created_at, &order.id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(event)
    }

    async fn get_order_by_booking(&self, booking_id: &BookingCode) -> Result<Option<OrderDetails>> {
        let Some(order_id) = self.order_id_for_booking(booking_id)? else {
            return Ok(None);
        };

        self.get_order(&order_id)?
            .map(|order| self.details(order))
            .transpose()
    }

    async fn list_orders_by_user(&self, user_id: &UserId) -> Result<Vec<OrderDetails>> {
        let mut ids = self.scan_index(cf::ORDERS_BY_USER, user_id.as_bytes())?;
        // Newest first
        ids.reverse();

        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = self.get_order(&OrderId::from_uuid(id))? {
                orders.push(self.details(order)?);
            }
        }
        Ok(orders)
    }

    async fn transition_order_status(
        &self,
        booking_id: &BookingCode,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        check_transition(from, to)?;

        let _guard = self.write_lock.lock().await;
        let not_found = || StoreError::NotFound {
            entity: "order",
            id: booking_id.to_string(),
        };

        let order_id = self.order_id_for_booking(booking_id)?.ok_or_else(not_found)?;
        let mut order = self.get_order(&order_id)?.ok_or_else(not_found)?;

        if order.status != from {
            return Ok(false);
        }

        order.status = to;
        order.updated_at = Utc::now();

        let cf = self.cf(cf::ORDERS)?;
        self.db
            .put_cf(&cf, keys::order_key(&order.id), Self::serialize(&order)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(true)
    }

    // =========================================================================
    // Ticket Operations
    // =========================================================================

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        let number_key = keys::ticket_number_key(&ticket.ticket_number);

        let _guard = self.write_lock.lock().await;
        let cf_tickets = self.cf(cf::TICKETS)?;
        let cf_by_order = self.cf(cf::TICKETS_BY_ORDER)?;
        let cf_numbers = self.cf(cf::TICKET_NUMBERS)?;

        let taken = self
            .db
            .get_cf(&cf_numbers, &number_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if taken {
            return Err(StoreError::Conflict(format!(
                "ticket number already exists: {}",
                ticket.ticket_number
            )));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_tickets, keys::ticket_key(&ticket.id), Self::serialize(ticket)?);
        batch.put_cf(&cf_numbers, &number_key, ticket.id.as_bytes());
        batch.put_cf(
            &cf_by_order,
            keys::order_ticket_key(&ticket.order_id, ticket.created_at, &ticket.id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_tickets_for_order(&self, order_id: &OrderId) -> Result<Vec<Ticket>> {
        self.tickets_for_order(order_id)
    }
}
