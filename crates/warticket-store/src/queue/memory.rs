//! In-process job queue.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::{DeadLetter, Delivery, Envelope, JobQueue, OutgoingMessage};
use crate::error::{Result, StoreError};

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Envelope>,
    unacked: HashMap<String, Envelope>,
    dead: Vec<DeadLetter>,
}

/// Job queue held in process memory.
///
/// Has the same delivery semantics as [`super::RedisQueue`] but nothing survives a
/// restart. Used by tests and single-process deployments.
#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
    notify: Notify,
}

impl MemoryQueue {
    /// Create a broker with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_receive(&self, queue: &str) -> Option<Delivery> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();

        let envelope = state.ready.pop_front()?;
        let receipt = Uuid::new_v4().to_string();
        state.unacked.insert(receipt.clone(), envelope.clone());
        Some(envelope.into_delivery(receipt))
    }

    fn take_unacked(
        queues: &mut HashMap<String, QueueState>,
        queue: &str,
        delivery: &Delivery,
    ) -> Result<Envelope> {
        queues
            .get_mut(queue)
            .and_then(|state| state.unacked.remove(&delivery.receipt))
            .ok_or_else(|| StoreError::Queue(format!("unknown delivery {} on {queue}", delivery.id)))
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn declare(&self, queue: &str) -> Result<()> {
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, message: OutgoingMessage) -> Result<()> {
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(Envelope::new(message));
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Delivery> {
        loop {
            let notified = self.notify.notified();
            if let Some(delivery) = self.try_receive(queue).await {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()> {
        let mut queues = self.queues.lock().await;
        Self::take_unacked(&mut queues, queue, delivery).map(|_| ())
    }

    async fn nack(&self, queue: &str, delivery: &Delivery, requeue: bool) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let envelope = Self::take_unacked(&mut queues, queue, delivery)?;
        if requeue {
            queues
                .entry(queue.to_string())
                .or_default()
                .ready
                .push_back(envelope.redelivery());
            drop(queues);
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn dead_letter(&self, queue: &str, delivery: &Delivery, reason: &str) -> Result<()> {
        let mut queues = self.queues.lock().await;
        let envelope = Self::take_unacked(&mut queues, queue, delivery)?;
        queues
            .entry(queue.to_string())
            .or_default()
            .dead
            .push(envelope.into_dead_letter(reason));
        Ok(())
    }

    async fn recover_unacked(&self, queue: &str) -> Result<usize> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();

        let mut recovered: Vec<Envelope> = state.unacked.drain().map(|(_, e)| e).collect();
        recovered.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        let count = recovered.len();
        state
            .ready
            .extend(recovered.iter().map(Envelope::redelivery));
        drop(queues);

        if count > 0 {
            self.notify.notify_waiters();
        }
        Ok(count)
    }

    async fn pending(&self, queue: &str) -> Result<usize> {
        Ok(self
            .queues
            .lock()
            .await
            .get(queue)
            .map_or(0, |state| state.ready.len()))
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>> {
        Ok(self
            .queues
            .lock()
            .await
            .get(queue)
            .map(|state| state.dead.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}
