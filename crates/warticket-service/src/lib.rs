//! War-ticket HTTP service.
//!
//! This crate provides the order-placement pipeline and its HTTP surface:
//!
//! - [`ledger`]: cache-backed stock ledger arbitrating concurrent reservations
//! - [`orders`]: order creation with reservation rollback, order queries
//! - [`payments`]: idempotent payment confirmation enqueuing fulfillment jobs
//! - [`fulfillment`]: the queue worker rendering and persisting one ticket per seat
//!
//! # Authentication
//!
//! Order endpoints take an HS256 JWT bearer token whose `sub` is the user's UUID.
//! The payment webhook is authenticated by an HMAC of its body when a secret is configured.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Health handler is async for routing

pub mod auth;
pub mod config;
pub mod error;
pub mod fulfillment;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod orders;
pub mod payments;
pub mod routes;
pub mod state;

pub use config::{ServiceConfig, StoreBackend};
pub use error::ApiError;
pub use fulfillment::{
    PdfTicketRenderer, RenderError, RetryPolicy, TicketData, TicketLayout, TicketRenderer,
    TicketWorker,
};
pub use ledger::{CachedStockLedger, StockLedger};
pub use orders::{OrderService, OrderView};
pub use payments::{ConfirmationOutcome, PaymentConfirmation};
pub use routes::create_router;
pub use state::AppState;
