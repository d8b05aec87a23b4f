//! `PostgreSQL` storage implementation.
//!
//! Stock bounds are enforced by the `events_available_stock_bounds` CHECK constraint
//! and uniqueness of booking codes and ticket numbers by UNIQUE constraints; violations
//! are mapped onto [`StoreError`] variants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use warticket_core::{
    BookingCode, Event, EventId, Order, OrderDetails, OrderId, OrderStatus, Ticket, TicketId,
    TicketNumber, UserId,
};

use crate::error::{Result, StoreError};
use crate::{check_transition, Store};

const CHECK_VIOLATION: &str = "23514";
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const EVENT_COLUMNS: &str = "id, name, location, date, price_cents, description, image, \
                             total_stock, available_stock, created_at";
const ORDER_COLUMNS: &str =
    "id, booking_id, user_id, event_id, quantity, status, created_at, updated_at";
const TICKET_COLUMNS: &str =
    "id, order_id, event_id, user_id, ticket_number, artifact_key, created_at";

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    async fn fetch_event(&self, event_id: &EventId) -> Result<Option<Event>> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(event_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        row.map(Event::try_from).transpose()
    }

    async fn details(&self, order: Order) -> Result<OrderDetails> {
        let event = self
            .fetch_event(&order.event_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "event",
                id: order.event_id.to_string(),
            })?;
        let tickets = self.list_tickets_for_order(&order.id).await?;

        Ok(OrderDetails {
            order,
            event,
            tickets,
        })
    }
}

fn db_error(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

/// Map constraint violations on writes to their domain meaning.
fn write_error(err: sqlx::Error, event_id: &EventId) -> StoreError {
    if let Some(db_err) = err.as_database_error() {
        match db_err.code().as_deref() {
            Some(CHECK_VIOLATION) => {
                return StoreError::InsufficientStock {
                    event_id: event_id.to_string(),
                }
            }
            Some(UNIQUE_VIOLATION) => return StoreError::Conflict(db_err.message().to_string()),
            Some(FOREIGN_KEY_VIOLATION) => {
                return StoreError::NotFound {
                    entity: "event",
                    id: event_id.to_string(),
                }
            }
            _ => {}
        }
    }
    db_error(err)
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Database(format!("{column} out of range: {value}")))
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative {column}: {value}")))
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    location: String,
    date: DateTime<Utc>,
    price_cents: i64,
    description: Option<String>,
    image: Option<String>,
    total_stock: i32,
    available_stock: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(Self {
            id: EventId::from_uuid(row.id),
            name: row.name,
            location: row.location,
            date: row.date,
            price_cents: row.price_cents,
            description: row.description,
            image: row.image,
            total_stock: to_u32(row.total_stock, "total_stock")?,
            available_stock: to_u32(row.available_stock, "available_stock")?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    booking_id: String,
    user_id: Uuid,
    event_id: Uuid,
    quantity: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Self {
            id: OrderId::from_uuid(row.id),
            booking_id: row
                .booking_id
                .parse::<BookingCode>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            user_id: UserId::from_uuid(row.user_id),
            event_id: EventId::from_uuid(row.event_id),
            quantity: to_u32(row.quantity, "quantity")?,
            status: row
                .status
                .parse::<OrderStatus>()
                .map_err(StoreError::Serialization)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    order_id: Uuid,
    event_id: Uuid,
    user_id: Uuid,
    ticket_number: String,
    artifact_key: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self> {
        Ok(Self {
            id: TicketId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            event_id: EventId::from_uuid(row.event_id),
            user_id: UserId::from_uuid(row.user_id),
            ticket_number: row
                .ticket_number
                .parse::<TicketNumber>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            artifact_key: row.artifact_key,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Event Operations
    // =========================================================================

    async fn put_event(&self, event: &Event) -> Result<()> {
        sqlx::query(
            "INSERT INTO events (id, name, location, date, price_cents, description, image, \
                                 total_stock, available_stock, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name,
                 location = EXCLUDED.location,
                 date = EXCLUDED.date,
                 price_cents = EXCLUDED.price_cents,
                 description = EXCLUDED.description,
                 image = EXCLUDED.image,
                 total_stock = EXCLUDED.total_stock,
                 available_stock = EXCLUDED.available_stock",
        )
        .bind(event.id.as_uuid())
        .bind(&event.name)
        .bind(&event.location)
        .bind(event.date)
        .bind(event.price_cents)
        .bind(&event.description)
        .bind(&event.image)
        .bind(to_i32(event.total_stock, "total_stock")?)
        .bind(to_i32(event.available_stock, "available_stock")?)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &event.id))?;

        Ok(())
    }

    async fn get_event(&self, event_id: &EventId) -> Result<Option<Event>> {
        self.fetch_event(event_id).await
    }

    // =========================================================================
    // Order Operations
    // =========================================================================

    async fn create_order(&self, order: &Order) -> Result<Event> {
        let quantity = to_i32(order.quantity, "quantity")?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            "INSERT INTO orders (id, booking_id, user_id, event_id, quantity, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order.id.as_uuid())
        .bind(order.booking_id.as_str())
        .bind(order.user_id.as_uuid())
        .bind(order.event_id.as_uuid())
        .bind(quantity)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, &order.event_id))?;

        let updated: Option<EventRow> = sqlx::query_as(&format!(
            "UPDATE events SET available_stock = available_stock - $1
             WHERE id = $2
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(quantity)
        .bind(order.event_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| write_error(e, &order.event_id))?;

        // Zero rows affected: dropping `tx` rolls the order insert back
        let Some(row) = updated else {
            return Err(StoreError::NotFound {
                entity: "event",
                id: order.event_id.to_string(),
            });
        };

        tx.commit().await.map_err(db_error)?;
        Event::try_from(row)
    }

    async fn get_order_by_booking(&self, booking_id: &BookingCode) -> Result<Option<OrderDetails>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE booking_id = $1"))
                .bind(booking_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        match row {
            Some(row) => Ok(Some(self.details(Order::try_from(row)?).await?)),
            None => Ok(None),
        }
    }

    async fn list_orders_by_user(&self, user_id: &UserId) -> Result<Vec<OrderDetails>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.details(Order::try_from(row)?).await?);
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

        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = NOW()
             WHERE booking_id = $2 AND status = $3",
        )
        .bind(to.as_str())
        .bind(booking_id.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM orders WHERE booking_id = $1)")
                .bind(booking_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

        if exists {
            Ok(false)
        } else {
            Err(StoreError::NotFound {
                entity: "order",
                id: booking_id.to_string(),
            })
        }
    }

    // =========================================================================
    // Ticket Operations
    // =========================================================================

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        sqlx::query(
            "INSERT INTO tickets (id, order_id, event_id, user_id, ticket_number, artifact_key, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.order_id.as_uuid())
        .bind(ticket.event_id.as_uuid())
        .bind(ticket.user_id.as_uuid())
        .bind(ticket.ticket_number.as_str())
        .bind(&ticket.artifact_key)
        .bind(ticket.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &ticket.event_id))?;

        Ok(())
    }

    async fn list_tickets_for_order(&self, order_id: &OrderId) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE order_id = $1 ORDER BY created_at"
        ))
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Ticket::try_from).collect()
    }
}
