//! Durable named work queues with at-least-once delivery.
//!
//! A received message stays unacknowledged until the consumer calls [`JobQueue::ack`],
//! [`JobQueue::nack`] or [`JobQueue::dead_letter`]. Messages left unacknowledged by a
//! crashed consumer are put back on the queue by [`JobQueue::recover_unacked`], which
//! consumers call on start.

mod memory;
mod redis;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Content type of JSON message bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Message payload.
    pub body: String,
    /// MIME type of the payload.
    pub content_type: String,
    /// Whether the message must survive a broker restart.
    pub persistent: bool,
}

impl OutgoingMessage {
    /// A persistent JSON message.
    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            persistent: true,
        }
    }
}

/// A received, not yet acknowledged message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Stable message ID, unchanged across redeliveries.
    pub id: String,
    /// Message payload.
    pub body: String,
    /// MIME type of the payload.
    pub content_type: String,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
    /// Backend handle used to settle the delivery.
    pub receipt: String,
}

/// A message that was removed from its queue without being processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Message ID.
    pub id: String,
    /// Message payload.
    pub body: String,
    /// Attempts made before giving up.
    pub attempt: u32,
    /// Why the message was dead-lettered.
    pub reason: String,
    /// When the message was dead-lettered.
    pub failed_at: DateTime<Utc>,
}

/// Wire envelope kept in the backend for every queued message.
///
/// `attempt` counts deliveries made before this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Envelope {
    pub id: String,
    pub body: String,
    pub content_type: String,
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Envelope {
    pub(crate) fn new(message: OutgoingMessage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body: message.body,
            content_type: message.content_type,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// The same message for its next delivery attempt.
    pub(crate) fn redelivery(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }

    pub(crate) fn into_delivery(self, receipt: String) -> Delivery {
        Delivery {
            id: self.id,
            body: self.body,
            content_type: self.content_type,
            attempt: self.attempt + 1,
            receipt,
        }
    }

    pub(crate) fn into_dead_letter(self, reason: &str) -> DeadLetter {
        DeadLetter {
            id: self.id,
            body: self.body,
            attempt: self.attempt + 1,
            reason: reason.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// A broker of named durable queues.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Declare a durable queue. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Queue` if the broker is unreachable.
    async fn declare(&self, queue: &str) -> Result<()>;

    /// Append a message to a queue.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Queue` if the broker is unreachable.
    async fn publish(&self, queue: &str, message: OutgoingMessage) -> Result<()>;

    /// Wait for the next message and mark it unacknowledged.
    ///
    /// Cancelling the returned future before it resolves loses no message.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Queue` if the broker is unreachable.
    async fn receive(&self, queue: &str) -> Result<Delivery>;

    /// Remove a processed message for good.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Queue` if the broker is unreachable.
    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()>;

    /// Reject a message, putting it back at the tail of the queue when `requeue` is set
    /// and dropping it otherwise.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Queue` if the broker is unreachable.
    async fn nack(&self, queue: &str, delivery: &Delivery, requeue: bool) -> Result<()>;

    /// Move a message to the queue's dead-letter list.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Queue` if the broker is unreachable.
    async fn dead_letter(&self, queue: &str, delivery: &Delivery, reason: &str) -> Result<()>;

    /// Put every unacknowledged message back on the queue, returning how many moved.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Queue` if the broker is unreachable.
    async fn recover_unacked(&self, queue: &str) -> Result<usize>;

    /// Number of messages waiting for delivery.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Queue` if the broker is unreachable.
    async fn pending(&self, queue: &str) -> Result<usize>;

    /// Dead-lettered messages of a queue, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Queue` if the broker is unreachable.
    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>>;
}
