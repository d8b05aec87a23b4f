//! Core types for the war-ticket service.
//!
//! This crate provides the domain vocabulary shared by the store and the service:
//!
//! - **Identifiers**: `UserId`, `EventId`, `OrderId`, `TicketId`, `BookingCode`, `TicketNumber`
//! - **Events**: `Event` with its fixed `total_stock` and mutable `available_stock`
//! - **Orders**: `Order`, `OrderStatus`, `OrderDetails`
//! - **Tickets**: `Ticket`, one per purchased seat
//! - **Fulfillment**: `FulfillmentJob`, the message handed from payment confirmation to the worker
//!
//! # Order lifecycle
//!
//! ```text
//! PENDING --(payment confirmed)--> PAID --(all tickets persisted)--> COMPLETED
//!                                    \--(delivery attempts exhausted)--> FAILED
//! ```
//!
//! Status only ever moves forward; see [`OrderStatus::can_transition_to`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod event;
pub mod fulfillment;
pub mod ids;
pub mod order;
pub mod ticket;

pub use error::{Result, TicketError};
pub use event::Event;
pub use fulfillment::{is_paid_signal, FulfillmentJob, FULFILLMENT_QUEUE, PAID_SIGNALS};
pub use ids::{BookingCode, EventId, IdError, OrderId, TicketId, TicketNumber, UserId};
pub use order::{Order, OrderDetails, OrderStatus};
pub use ticket::{Ticket, TICKET_CONTENT_TYPE};
