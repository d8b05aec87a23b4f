//! Order placement and order queries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use warticket_core::{
    BookingCode, Event, EventId, Order, OrderDetails, OrderId, OrderStatus, Result, Ticket,
    TicketError, TicketId, TicketNumber, UserId,
};
use warticket_store::{BlobStore, Store, StoreError};

use crate::ledger::StockLedger;

/// Event snapshot shown alongside an order.
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    /// Event ID.
    pub id: EventId,
    /// Event name.
    pub name: String,
    /// Venue.
    pub location: String,
    /// Start time.
    pub date: DateTime<Utc>,
    /// Price of one seat in cents.
    pub price_cents: i64,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Signed URL of the event image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Seats left according to the durable store.
    pub available_stock: u32,
}

/// A persisted ticket with a download link.
#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    /// Ticket ID.
    pub id: TicketId,
    /// Printed ticket number.
    pub ticket_number: TicketNumber,
    /// Signed URL of the rendered artifact.
    pub url: String,
    /// When the ticket was issued.
    pub created_at: DateTime<Utc>,
}

/// An order as returned to its owner.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    /// Order ID.
    pub id: OrderId,
    /// Booking code.
    pub booking_id: BookingCode,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Seats purchased.
    pub quantity: u32,
    /// `price_cents * quantity`.
    pub total_cents: i64,
    /// The event.
    pub event: EventView,
    /// Tickets issued so far; empty until fulfillment has run.
    pub tickets: Vec<TicketView>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

/// Creates orders against the stock ledger and serves them back to their owners.
pub struct OrderService {
    ledger: Arc<dyn StockLedger>,
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    signed_url_ttl: Duration,
}

impl OrderService {
    /// Create the service.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn StockLedger>,
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            store,
            blobs,
            signed_url_ttl,
        }
    }

    /// Reserve `quantity` seats and record a PENDING order for them.
    ///
    /// The reservation is released again if the order cannot be committed, so the
    /// ledger after a failed call equals the ledger before it.
    ///
    /// # Errors
    ///
    /// - `TicketError::InvalidQuantity` if `quantity` is zero.
    /// - `TicketError::NotEnoughStock` if the ledger or the durable store refuses the seats.
    /// - `TicketError::EventNotFound` if the event does not exist.
    /// - `TicketError::Internal` on collaborator failure.
    pub async fn create_order(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<OrderView> {
        let remaining = self.ledger.try_reserve(&event_id, quantity).await?;

        match self.commit_order(user_id, event_id, quantity).await {
            Ok((order, event)) => {
                tracing::info!(
                    booking_id = %order.booking_id,
                    event_id = %event_id,
                    user_id = %user_id,
                    quantity,
                    remaining,
                    "Order created"
                );
                Ok(self.present(order, event, Vec::new()))
            }
            Err(err) => {
                if let Err(release_err) = self.ledger.release(&event_id, quantity).await {
                    tracing::error!(
                        event_id = %event_id,
                        quantity,
                        error = %release_err,
                        "Failed to release reservation after order failure"
                    );
                }
                tracing::warn!(event_id = %event_id, quantity, error = %err, "Order creation failed");
                Err(err)
            }
        }
    }

    async fn commit_order(
        &self,
        user_id: UserId,
        event_id: EventId,
        quantity: u32,
    ) -> Result<(Order, Event)> {
        let order = Order::new_pending(user_id, event_id, quantity)?;

        let event = self
            .store
            .create_order(&order)
            .await
            .map_err(|err| match err {
                StoreError::InsufficientStock { .. } => TicketError::NotEnoughStock {
                    event_id,
                    requested: quantity,
                },
                StoreError::NotFound { .. } => TicketError::EventNotFound {
                    event_id: event_id.to_string(),
                },
                other => other.into(),
            })?;

        Ok((order, event))
    }

    /// Get one of `requester`'s orders by booking code.
    ///
    /// Orders owned by someone else are reported as not found.
    ///
    /// # Errors
    ///
    /// - `TicketError::OrderNotFound` if no such order is visible to `requester`.
    /// - `TicketError::Internal` on collaborator failure.
    pub async fn get_order_by_booking(
        &self,
        booking_id: &BookingCode,
        requester: &UserId,
    ) -> Result<OrderView> {
        let details = self
            .store
            .get_order_by_booking(booking_id)
            .await?
            .filter(|details| details.order.user_id == *requester)
            .ok_or_else(|| TicketError::OrderNotFound {
                booking_id: booking_id.to_string(),
            })?;

        Ok(self.present_details(details))
    }

    /// All of `user_id`'s orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `TicketError::Internal` on collaborator failure.
    pub async fn list_orders(&self, user_id: &UserId) -> Result<Vec<OrderView>> {
        let orders = self.store.list_orders_by_user(user_id).await?;
        Ok(orders
            .into_iter()
            .map(|details| self.present_details(details))
            .collect())
    }

    fn present_details(&self, details: OrderDetails) -> OrderView {
        let OrderDetails {
            order,
            event,
            tickets,
        } = details;
        self.present(order, event, tickets)
    }

    fn present(&self, order: Order, event: Event, tickets: Vec<Ticket>) -> OrderView {
        let image_url = event.image.as_deref().and_then(|key| self.sign(key));
        let tickets = tickets
            .into_iter()
            .filter_map(|ticket| {
                let url = self.sign(&ticket.artifact_key)?;
                Some(TicketView {
                    id: ticket.id,
                    ticket_number: ticket.ticket_number,
                    url,
                    created_at: ticket.created_at,
                })
            })
            .collect();

        OrderView {
            id: order.id,
            booking_id: order.booking_id,
            status: order.status,
            quantity: order.quantity,
            total_cents: event.total_for(order.quantity),
            event: EventView {
                id: event.id,
                name: event.name,
                location: event.location,
                date: event.date,
                price_cents: event.price_cents,
                description: event.description,
                image_url,
                available_stock: event.available_stock,
            },
            tickets,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }

    fn sign(&self, key: &str) -> Option<String> {
        match self.blobs.signed_url(key, self.signed_url_ttl) {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "Failed to sign blob URL");
                None
            }
        }
    }
}
