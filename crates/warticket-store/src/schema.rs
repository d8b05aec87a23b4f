//! Column families of the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Event records, keyed by `event_id`.
    pub const EVENTS: &str = "events";

    /// Order records, keyed by `order_id`.
    pub const ORDERS: &str = "orders";

    /// Unique index: booking code to `order_id`.
    pub const ORDERS_BY_BOOKING: &str = "orders_by_booking";

    /// Index: orders by user, keyed by `user_id || created_at || order_id`.
    /// Value is empty (index only).
    pub const ORDERS_BY_USER: &str = "orders_by_user";

    /// Ticket records, keyed by `ticket_id`.
    pub const TICKETS: &str = "tickets";

    /// Index: tickets by order, keyed by `order_id || created_at || ticket_id`.
    /// Value is empty (index only).
    pub const TICKETS_BY_ORDER: &str = "tickets_by_order";

    /// Unique index: ticket number to `ticket_id`.
    pub const TICKET_NUMBERS: &str = "ticket_numbers";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::EVENTS,
        cf::ORDERS,
        cf::ORDERS_BY_BOOKING,
        cf::ORDERS_BY_USER,
        cf::TICKETS,
        cf::TICKETS_BY_ORDER,
        cf::TICKET_NUMBERS,
    ]
}
