//! Payment confirmation: PENDING -> PAID plus a fulfillment job.
//!
//! The payment gateway redelivers notifications, so confirming is idempotent: the status
//! change is a conditional update and only the caller that wins it enqueues a job.

use std::sync::Arc;

use warticket_core::{
    is_paid_signal, BookingCode, FulfillmentJob, OrderStatus, Result, TicketError,
};
use warticket_store::{JobQueue, OutgoingMessage, Store};

/// What a confirmation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// The payment status is not a paid signal.
    Ignored,
    /// The order had already left PENDING; it is in the given status.
    AlreadyProcessed(OrderStatus),
    /// The order moved to PAID and a fulfillment job was published.
    Enqueued,
}

impl ConfirmationOutcome {
    /// Short label for responses and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::AlreadyProcessed(_) => "already_processed",
            Self::Enqueued => "enqueued",
        }
    }
}

/// Applies payment notifications to orders.
pub struct PaymentConfirmation {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    queue_name: String,
}

impl PaymentConfirmation {
    /// Create a handler publishing to `queue_name`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            queue,
            queue_name: queue_name.into(),
        }
    }

    /// Apply a `(booking_id, payment_status)` notification.
    ///
    /// A publish failure is returned after the order has already moved to PAID; the
    /// status change is not rolled back.
    ///
    /// # Errors
    ///
    /// - `TicketError::InvalidId` if a paid notification carries a malformed booking code.
    /// - `TicketError::OrderNotFound` if the booking code is unknown.
    /// - `TicketError::Internal` if the store or the queue fails.
    pub async fn confirm(
        &self,
        booking_id: &str,
        payment_status: &str,
    ) -> Result<ConfirmationOutcome> {
        if !is_paid_signal(payment_status) {
            tracing::info!(
                booking_id = %booking_id,
                payment_status = %payment_status,
                "Ignoring non-paid payment notification"
            );
            return Ok(ConfirmationOutcome::Ignored);
        }

        let booking_id: BookingCode = booking_id.parse()?;
        let booking_id = &booking_id;

        let status = self.current_status(booking_id).await?;
        if status != OrderStatus::Pending {
            tracing::info!(
                booking_id = %booking_id,
                status = %status,
                "Order already confirmed"
            );
            return Ok(ConfirmationOutcome::AlreadyProcessed(status));
        }

        let moved = self
            .store
            .transition_order_status(booking_id, OrderStatus::Pending, OrderStatus::Paid)
            .await?;
        if !moved {
            // A concurrent delivery of the same notification got there first
            let status = self.current_status(booking_id).await?;
            tracing::info!(booking_id = %booking_id, status = %status, "Order confirmed concurrently");
            return Ok(ConfirmationOutcome::AlreadyProcessed(status));
        }

        let body = FulfillmentJob::paid(booking_id.clone())
            .to_json()
            .map_err(TicketError::internal)?;

        if let Err(err) = self
            .queue
            .publish(&self.queue_name, OutgoingMessage::json(body))
            .await
        {
            tracing::error!(
                booking_id = %booking_id,
                queue = %self.queue_name,
                error = %err,
                "Order is PAID but its fulfillment job could not be published"
            );
            return Err(err.into());
        }

        tracing::info!(booking_id = %booking_id, queue = %self.queue_name, "Payment confirmed, fulfillment enqueued");
        Ok(ConfirmationOutcome::Enqueued)
    }

    async fn current_status(&self, booking_id: &BookingCode) -> Result<OrderStatus> {
        self.store
            .get_order_by_booking(booking_id)
            .await?
            .map(|details| details.order.status)
            .ok_or_else(|| TicketError::OrderNotFound {
                booking_id: booking_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use warticket_core::{Event, Order, UserId, FULFILLMENT_QUEUE};
    use warticket_store::{DeadLetter, Delivery, MemoryQueue, MemoryStore, StoreError};

    use super::*;

    async fn pending_order(store: &MemoryStore) -> Order {
        let event = Event::new("Match", "Stadium", Utc::now(), 1_500, 10);
        store.put_event(&event).await.unwrap();
        let order = Order::new_pending(UserId::generate(), event.id, 2).unwrap();
        store.create_order(&order).await.unwrap();
        order
    }

    fn handler(store: Arc<MemoryStore>, queue: Arc<dyn JobQueue>) -> PaymentConfirmation {
        PaymentConfirmation::new(store, queue, FULFILLMENT_QUEUE)
    }

    #[tokio::test]
    async fn paid_signal_moves_order_and_enqueues_job() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let order = pending_order(&store).await;

        let outcome = handler(store.clone(), queue.clone())
            .confirm(order.booking_id.as_str(), "SETTLEMENT")
            .await
            .unwrap();

        assert_eq!(outcome, ConfirmationOutcome::Enqueued);
        let delivery = queue.receive(FULFILLMENT_QUEUE).await.unwrap();
        let job = FulfillmentJob::from_json(&delivery.body).unwrap();
        assert_eq!(job, FulfillmentJob::paid(order.booking_id.clone()));
        assert_eq!(delivery.content_type, "application/json");
    }

    #[tokio::test]
    async fn confirming_twice_enqueues_once() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let order = pending_order(&store).await;
        let handler = handler(store.clone(), queue.clone());

        handler.confirm(order.booking_id.as_str(), "PAID").await.unwrap();
        let second = handler.confirm(order.booking_id.as_str(), "PAID").await.unwrap();

        assert_eq!(
            second,
            ConfirmationOutcome::AlreadyProcessed(OrderStatus::Paid)
        );
        assert_eq!(queue.pending(FULFILLMENT_QUEUE).await.unwrap(), 1);
        let details = store
            .get_order_by_booking(&order.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(details.order.status, OrderStatus::Paid);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redeliveries_enqueue_once() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let order = pending_order(&store).await;
        let handler = Arc::new(handler(store.clone(), queue.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handler = Arc::clone(&handler);
                let booking_id = order.booking_id.clone();
                tokio::spawn(async move { handler.confirm(booking_id.as_str(), "PAID").await.unwrap() })
            })
            .collect();

        let mut enqueued = 0;
        for task in tasks {
            if task.await.unwrap() == ConfirmationOutcome::Enqueued {
                enqueued += 1;
            }
        }

        assert_eq!(enqueued, 1);
        assert_eq!(queue.pending(FULFILLMENT_QUEUE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn non_paid_signals_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let order = pending_order(&store).await;
        let handler = handler(store.clone(), queue.clone());

        for status in ["PENDING", "EXPIRED", "paid"] {
            let outcome = handler.confirm(order.booking_id.as_str(), status).await.unwrap();
            assert_eq!(outcome, ConfirmationOutcome::Ignored);
        }

        assert_eq!(queue.pending(FULFILLMENT_QUEUE).await.unwrap(), 0);
        let details = store
            .get_order_by_booking(&order.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(details.order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let booking = warticket_core::BookingCode::generate(&UserId::generate());

        let err = handler(store, queue)
            .confirm(booking.as_str(), "PAID")
            .await
            .unwrap_err();

        assert!(matches!(err, TicketError::OrderNotFound { .. }));
    }

    #[tokio::test]
    async fn malformed_booking_code_only_matters_for_paid_signals() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let handler = handler(store, queue.clone());

        let ignored = handler.confirm("order-123", "EXPIRE").await.unwrap();
        assert_eq!(ignored, ConfirmationOutcome::Ignored);

        let err = handler.confirm("order-123", "PAID").await.unwrap_err();
        assert!(matches!(err, TicketError::InvalidId(_)));
        assert_eq!(queue.pending(FULFILLMENT_QUEUE).await.unwrap(), 0);
    }

    /// Queue that refuses every publish.
    struct BrokenQueue;

    #[async_trait]
    impl JobQueue for BrokenQueue {
        async fn declare(&self, _: &str) -> warticket_store::Result<()> {
            Ok(())
        }
        async fn publish(&self, _: &str, _: OutgoingMessage) -> warticket_store::Result<()> {
            Err(StoreError::Queue("broker unavailable".into()))
        }
        async fn receive(&self, _: &str) -> warticket_store::Result<Delivery> {
            Err(StoreError::Queue("broker unavailable".into()))
        }
        async fn ack(&self, _: &str, _: &Delivery) -> warticket_store::Result<()> {
            Ok(())
        }
        async fn nack(&self, _: &str, _: &Delivery, _: bool) -> warticket_store::Result<()> {
            Ok(())
        }
        async fn dead_letter(&self, _: &str, _: &Delivery, _: &str) -> warticket_store::Result<()> {
            Ok(())
        }
        async fn recover_unacked(&self, _: &str) -> warticket_store::Result<usize> {
            Ok(0)
        }
        async fn pending(&self, _: &str) -> warticket_store::Result<usize> {
            Ok(0)
        }
        async fn dead_letters(&self, _: &str) -> warticket_store::Result<Vec<DeadLetter>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn publish_failure_surfaces_and_keeps_paid_status() {
        let store = Arc::new(MemoryStore::new());
        let order = pending_order(&store).await;

        let err = handler(store.clone(), Arc::new(BrokenQueue))
            .confirm(order.booking_id.as_str(), "PAID")
            .await
            .unwrap_err();

        assert!(matches!(err, TicketError::Internal(_)));
        let details = store
            .get_order_by_booking(&order.booking_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(details.order.status, OrderStatus::Paid);
    }
}
