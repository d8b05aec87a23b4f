//! API handlers.

pub mod blobs;
pub mod health;
pub mod orders;
pub mod webhooks;
