//! In-process storage implementation.
//!
//! Every operation takes a single lock over all tables, so multi-row operations such as
//! [`Store::create_order`] are atomic with respect to each other.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use warticket_core::{
    BookingCode, Event, EventId, Order, OrderDetails, OrderId, OrderStatus, Ticket, UserId,
};

use crate::error::{Result, StoreError};
use crate::{check_transition, Store};

#[derive(Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    orders: HashMap<OrderId, Order>,
    orders_by_booking: HashMap<BookingCode, OrderId>,
    tickets: Vec<Ticket>,
}

impl Tables {
    fn details(&self, order: &Order) -> Result<OrderDetails> {
        let event = self
            .events
            .get(&order.event_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "event",
                id: order.event_id.to_string(),
            })?;

        let tickets = self
            .tickets
            .iter()
            .filter(|t| t.order_id == order.id)
            .cloned()
            .collect();

        Ok(OrderDetails {
            order: order.clone(),
            event,
            tickets,
        })
    }
}

/// Memory-backed storage implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_event(&self, event: &Event) -> Result<()> {
        self.tables
            .write()
            .await
            .events
            .insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, event_id: &EventId) -> Result<Option<Event>> {
        Ok(self.tables.read().await.events.get(event_id).cloned())
    }

    async fn create_order(&self, order: &Order) -> Result<Event> {
        let mut tables = self.tables.write().await;

        if tables.orders_by_booking.contains_key(&order.booking_id) {
            return Err(StoreError::Conflict(format!(
                "booking code already exists: {}",
                order.booking_id
            )));
        }

        // Validate the stock update before touching any table so a failure leaves no trace
        let event = tables
            .events
            .get_mut(&order.event_id)
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
        let snapshot = event.clone();

        tables
            .orders_by_booking
            .insert(order.booking_id.clone(), order.id);
        tables.orders.insert(order.id, order.clone());

        Ok(snapshot)
    }

    async fn get_order_by_booking(&self, booking_id: &BookingCode) -> Result<Option<OrderDetails>> {
        let tables = self.tables.read().await;

        tables
            .orders_by_booking
            .get(booking_id)
            .and_then(|id| tables.orders.get(id))
            .map(|order| tables.details(order))
            .transpose()
    }

    async fn list_orders_by_user(&self, user_id: &UserId) -> Result<Vec<OrderDetails>> {
        let tables = self.tables.read().await;

        let mut orders: Vec<&Order> = tables
            .orders
            .values()
            .filter(|o| o.user_id == *user_id)
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        orders.into_iter().map(|o| tables.details(o)).collect()
    }

    async fn transition_order_status(
        &self,
        booking_id: &BookingCode,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        check_transition(from, to)?;

        let mut tables = self.tables.write().await;
        let order_id = *tables
            .orders_by_booking
            .get(booking_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                id: booking_id.to_string(),
            })?;

        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::Database(format!("dangling booking index: {booking_id}")))?;

        if order.status != from {
            return Ok(false);
        }

        order.status = to;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        let mut tables = self.tables.write().await;

        if tables
            .tickets
            .iter()
            .any(|t| t.ticket_number == ticket.ticket_number)
        {
            return Err(StoreError::Conflict(format!(
                "ticket number already exists: {}",
                ticket.ticket_number
            )));
        }

        tables.tickets.push(ticket.clone());
        Ok(())
    }

    async fn list_tickets_for_order(&self, order_id: &OrderId) -> Result<Vec<Ticket>> {
        Ok(self
            .tables
            .read()
            .await
            .tickets
            .iter()
            .filter(|t| t.order_id == *order_id)
            .cloned()
            .collect())
    }
}
