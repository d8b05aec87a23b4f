//! Asynchronous ticket fulfillment.
//!
//! - [`TicketWorker`]: queue consumer producing one ticket per purchased seat
//! - [`RetryPolicy`]: redelivery backoff and the dead-letter cutoff
//! - [`TicketRenderer`]: artifact rendering, implemented by [`PdfTicketRenderer`] over a [`TicketLayout`]

pub mod render;
pub mod retry;
pub mod worker;

pub use render::{
    Element, PdfTicketRenderer, RenderError, TicketData, TicketLayout, TicketRenderer,
};
pub use retry::RetryPolicy;
pub use worker::{Disposition, TicketWorker};
