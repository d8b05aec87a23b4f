//! The ticket fulfillment worker.
//!
//! A single consumer of the fulfillment queue. For each job it loads the paid order,
//! produces the seats that have no ticket yet (render, upload, persist), moves the
//! order to COMPLETED and only then acknowledges the message. Redelivery of a message
//! that already partly succeeded therefore only produces the missing tickets.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use warticket_core::{
    Event, FulfillmentJob, Order, OrderStatus, Ticket, TicketNumber, TICKET_CONTENT_TYPE,
};
use warticket_store::{BlobStore, Delivery, JobQueue, Store, StoreError};

use super::render::{RenderError, TicketData, TicketRenderer};
use super::retry::RetryPolicy;

/// Fresh ticket numbers tried per seat before giving up on unique-number collisions.
const TICKET_NUMBER_ATTEMPTS: usize = 3;

/// Pause after a failed receive before polling the queue again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What the worker did with one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Tickets were produced and the order is COMPLETED; the message was acknowledged.
    Completed {
        /// Tickets created by this delivery.
        issued: u32,
    },
    /// The order was already in a terminal status; the message was acknowledged.
    AlreadyFinal(OrderStatus),
    /// Processing failed; the message was put back for another attempt.
    Requeued,
    /// The message was moved to the dead-letter list.
    DeadLettered,
}

#[derive(Debug, thiserror::Error)]
enum JobError {
    /// Redelivering the message cannot help.
    #[error("{0}")]
    Permanent(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Consumes fulfillment jobs and turns paid orders into tickets.
pub struct TicketWorker {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    blobs: Arc<dyn BlobStore>,
    renderer: Arc<dyn TicketRenderer>,
    queue_name: String,
    retry: RetryPolicy,
}

impl TicketWorker {
    /// Create a worker for `queue_name`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        blobs: Arc<dyn BlobStore>,
        renderer: Arc<dyn TicketRenderer>,
        queue_name: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            queue,
            blobs,
            renderer,
            queue_name: queue_name.into(),
            retry,
        }
    }

    /// Consume the queue until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Messages left unacknowledged by a previous run are put back on the queue first.
    /// A message already being processed when shutdown is signalled is finished.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be declared or recovered.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StoreError> {
        self.queue.declare(&self.queue_name).await?;

        let recovered = self.queue.recover_unacked(&self.queue_name).await?;
        tracing::info!(
            queue = %self.queue_name,
            recovered,
            max_attempts = self.retry.max_attempts,
            "Ticket worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                received = self.queue.receive(&self.queue_name) => received,
            };

            match received {
                Ok(delivery) => {
                    self.process(delivery, Some(&shutdown)).await;
                }
                Err(e) => {
                    tracing::error!(queue = %self.queue_name, error = %e, "Failed to receive from queue");
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        () = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!(queue = %self.queue_name, "Ticket worker stopped");
        Ok(())
    }

    /// Process one delivery and settle it with the queue.
    ///
    /// A failed attempt waits out its full backoff before the message is requeued.
    pub async fn handle_delivery(&self, delivery: Delivery) -> Disposition {
        self.process(delivery, None).await
    }

    /// Like [`Self::handle_delivery`], but a shutdown signal cuts the retry backoff
    /// short so the message is requeued at once.
    async fn process(
        &self,
        delivery: Delivery,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Disposition {
        let job = match FulfillmentJob::from_json(&delivery.body) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(
                    message_id = %delivery.id,
                    error = %e,
                    "Dead-lettering malformed fulfillment job"
                );
                self.dead_letter(&delivery, &format!("malformed job: {e}"))
                    .await;
                return Disposition::DeadLettered;
            }
        };

        tracing::info!(
            booking_id = %job.booking_id,
            attempt = delivery.attempt,
            "Processing fulfillment job"
        );

        match self.fulfill(&job).await {
            Ok(disposition) => {
                if let Err(e) = self.queue.ack(&self.queue_name, &delivery).await {
                    // The message comes back and the redelivery finds nothing to do
                    tracing::error!(booking_id = %job.booking_id, error = %e, "Failed to ack fulfillment job");
                }
                disposition
            }
            Err(JobError::Permanent(reason)) => {
                tracing::warn!(booking_id = %job.booking_id, reason = %reason, "Fulfillment job cannot succeed");
                self.dead_letter(&delivery, &reason).await;
                Disposition::DeadLettered
            }
            Err(e) => self.retry_or_give_up(&job, &delivery, &e, shutdown).await,
        }
    }

    async fn retry_or_give_up(
        &self,
        job: &FulfillmentJob,
        delivery: &Delivery,
        error: &JobError,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Disposition {
        if self.retry.should_retry(delivery.attempt) {
            let delay = self.retry.delay_for_attempt(delivery.attempt);
            tracing::warn!(
                booking_id = %job.booking_id,
                attempt = delivery.attempt,
                retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Fulfillment failed, will retry"
            );
            if backoff(delay, shutdown).await {
                tracing::info!(booking_id = %job.booking_id, "Shutting down, requeueing without backoff");
            }

            if let Err(e) = self.queue.nack(&self.queue_name, delivery, true).await {
                tracing::error!(booking_id = %job.booking_id, error = %e, "Failed to requeue fulfillment job");
            }
            return Disposition::Requeued;
        }

        tracing::error!(
            booking_id = %job.booking_id,
            attempt = delivery.attempt,
            error = %error,
            "Fulfillment failed on final attempt"
        );
        self.dead_letter(delivery, &error.to_string()).await;

        match self
            .store
            .transition_order_status(&job.booking_id, OrderStatus::Paid, OrderStatus::Failed)
            .await
        {
            Ok(true) => tracing::warn!(booking_id = %job.booking_id, "Order marked FAILED"),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(booking_id = %job.booking_id, error = %e, "Failed to mark order FAILED");
            }
        }
        Disposition::DeadLettered
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) {
        if let Err(e) = self
            .queue
            .dead_letter(&self.queue_name, delivery, reason)
            .await
        {
            tracing::error!(message_id = %delivery.id, error = %e, "Failed to dead-letter message");
        }
    }

    async fn fulfill(&self, job: &FulfillmentJob) -> Result<Disposition, JobError> {
        let details = self
            .store
            .get_order_by_booking(&job.booking_id)
            .await?
            .ok_or_else(|| JobError::Permanent(format!("order {} not found", job.booking_id)))?;

        let order = &details.order;
        match order.status {
            OrderStatus::Paid => {}
            status if status.is_terminal() => {
                tracing::info!(booking_id = %order.booking_id, status = %status, "Order already final, nothing to do");
                return Ok(Disposition::AlreadyFinal(status));
            }
            status => {
                return Err(JobError::Permanent(format!(
                    "order {} is {status}, not PAID",
                    order.booking_id
                )));
            }
        }

        let existing = u32::try_from(details.tickets.len()).unwrap_or(u32::MAX);
        let missing = order.quantity.saturating_sub(existing);
        if existing > 0 {
            tracing::info!(
                booking_id = %order.booking_id,
                existing,
                missing,
                "Resuming partially fulfilled order"
            );
        }

        let image = self.load_event_image(&details.event).await;

        for _ in 0..missing {
            let ticket = self
                .issue_ticket(order, &details.event, image.as_deref())
                .await?;
            tracing::debug!(
                booking_id = %order.booking_id,
                ticket_number = %ticket.ticket_number,
                "Ticket issued"
            );
        }

        let moved = self
            .store
            .transition_order_status(&order.booking_id, OrderStatus::Paid, OrderStatus::Completed)
            .await?;
        if !moved {
            tracing::warn!(booking_id = %order.booking_id, "Order left PAID while its tickets were produced");
        }

        tracing::info!(
            booking_id = %order.booking_id,
            quantity = order.quantity,
            issued = missing,
            "Order fulfilled"
        );
        Ok(Disposition::Completed { issued: missing })
    }

    /// Best-effort fetch of the event image; tickets are rendered without it on failure.
    async fn load_event_image(&self, event: &Event) -> Option<Vec<u8>> {
        let key = event.image.as_deref()?;
        match self.blobs.get(key).await {
            Ok(Some(blob)) => Some(blob.bytes),
            Ok(None) => {
                tracing::warn!(event_id = %event.id, key = %key, "Event image missing from blob store");
                None
            }
            Err(e) => {
                tracing::warn!(event_id = %event.id, key = %key, error = %e, "Failed to fetch event image");
                None
            }
        }
    }

    async fn issue_ticket(
        &self,
        order: &Order,
        event: &Event,
        image: Option<&[u8]>,
    ) -> Result<Ticket, JobError> {
        for attempt in 1..=TICKET_NUMBER_ATTEMPTS {
            let ticket = Ticket::for_order(order, TicketNumber::generate(&order.booking_id));

            let pdf = self
                .render(TicketData {
                    event_name: event.name.clone(),
                    event_location: event.location.clone(),
                    event_date: event.date,
                    event_image: image.map(<[u8]>::to_vec),
                    booking_id: order.booking_id.to_string(),
                    ticket_number: ticket.ticket_number.to_string(),
                })
                .await?;

            // Numbers embed the booking code, so a colliding upload can only replace
            // the artifact of another seat of this same order.
            self.blobs
                .put(&ticket.artifact_key, pdf, TICKET_CONTENT_TYPE)
                .await?;

            match self.store.insert_ticket(&ticket).await {
                Ok(()) => return Ok(ticket),
                Err(StoreError::Conflict(_)) => {
                    tracing::warn!(
                        booking_id = %order.booking_id,
                        ticket_number = %ticket.ticket_number,
                        attempt,
                        "Ticket number collision, generating another"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(JobError::Store(StoreError::Conflict(format!(
            "no unique ticket number for order {} after {TICKET_NUMBER_ATTEMPTS} attempts",
            order.booking_id
        ))))
    }

    async fn render(&self, data: TicketData) -> Result<Vec<u8>, RenderError> {
        let renderer = Arc::clone(&self.renderer);
        tokio::task::spawn_blocking(move || renderer.render(&data))
            .await
            .map_err(|e| RenderError::Aborted(e.to_string()))?
    }
}

/// Sleep for `delay`. Returns `true` when shutdown was signalled first.
async fn backoff(delay: Duration, shutdown: Option<&watch::Receiver<bool>>) -> bool {
    let Some(shutdown) = shutdown else {
        tokio::time::sleep(delay).await;
        return false;
    };

    let mut shutdown = shutdown.clone();
    tokio::select! {
        // A dropped sender counts as shutdown, as in the consume loop
        _ = shutdown.wait_for(|stop| *stop) => true,
        () = tokio::time::sleep(delay) => false,
    }
}
