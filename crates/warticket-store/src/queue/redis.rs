//! Redis-backed job queue.
//!
//! Each queue is three lists:
//!
//! ```text
//! queue:{name}             ready messages, LPUSH on publish
//! queue:{name}:processing  delivered, not yet settled (BLMOVE from the ready list)
//! queue:{name}:dead        dead letters, newest first
//! ```
//!
//! Messages are JSON envelopes. The exact envelope string in the processing list is the
//! delivery receipt, so settling a delivery is an `LREM` of that string.
//!
//! Blocking pops run on their own connection. Commands on a multiplexed connection are
//! answered in order, so a pending `BLMOVE` would otherwise stall every publish and ack
//! sharing it.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Direction, Script};

use super::{DeadLetter, Delivery, Envelope, JobQueue, OutgoingMessage};
use crate::error::{Result, StoreError};

/// How long a single blocking pop waits before polling again.
const RECEIVE_POLL: Duration = Duration::from_secs(1);

/// Move every entry of KEYS[1] back onto KEYS[2], bumping the envelope attempt.
const RECOVER_LUA: &str = r"
local moved = 0
while true do
    local entry = redis.call('RPOP', KEYS[1])
    if not entry then
        break
    end
    local ok, envelope = pcall(cjson.decode, entry)
    if ok and type(envelope) == 'table' and envelope.attempt then
        envelope.attempt = envelope.attempt + 1
        entry = cjson.encode(envelope)
    end
    redis.call('LPUSH', KEYS[2], entry)
    moved = moved + 1
end
return moved
";

/// Job queue on a shared Redis instance.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    /// Used only for `BLMOVE`.
    blocking: ConnectionManager,
    recover: Script,
}

impl RedisQueue {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Queue` if the URL is invalid or the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Queue(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| StoreError::Queue(format!("failed to connect to redis: {e}")))?;
        let blocking = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Queue(format!("failed to connect to redis: {e}")))?;

        Ok(Self::with_connections(conn, blocking))
    }

    /// Wrap existing connection managers. `blocking` must not be shared with other users.
    #[must_use]
    pub fn with_connections(conn: ConnectionManager, blocking: ConnectionManager) -> Self {
        Self {
            conn,
            blocking,
            recover: Script::new(RECOVER_LUA),
        }
    }

    fn ready_key(queue: &str) -> String {
        format!("queue:{queue}")
    }

    fn processing_key(queue: &str) -> String {
        format!("queue:{queue}:processing")
    }

    fn dead_key(queue: &str) -> String {
        format!("queue:{queue}:dead")
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
        serde_json::to_string(value).map_err(|e| StoreError::Queue(e.to_string()))
    }

    fn decode_receipt(delivery: &Delivery) -> Result<Envelope> {
        serde_json::from_str(&delivery.receipt)
            .map_err(|e| StoreError::Queue(format!("corrupt delivery receipt: {e}")))
    }

    /// Remove `receipt` from the processing list and, in the same transaction,
    /// push `push.1` onto list `push.0`.
    async fn settle(&self, queue: &str, receipt: &str, push: Option<(String, String)>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .lrem(Self::processing_key(queue), 1, receipt)
            .ignore();
        if let Some((target, entry)) = push {
            pipe.lpush(target, entry).ignore();
        }

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Queue(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn declare(&self, queue: &str) -> Result<()> {
        // Redis lists exist implicitly; verify the connection instead
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Queue(e.to_string()))?;
        tracing::debug!(queue = %queue, "Queue declared");
        Ok(())
    }

    async fn publish(&self, queue: &str, message: OutgoingMessage) -> Result<()> {
        let mut conn = self.conn.clone();
        let entry = Self::encode(&Envelope::new(message))?;
        let _: () = conn
            .lpush(Self::ready_key(queue), entry)
            .await
            .map_err(|e| StoreError::Queue(e.to_string()))?;
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Delivery> {
        let ready = Self::ready_key(queue);
        let processing = Self::processing_key(queue);

        loop {
            let mut conn = self.blocking.clone();
            let entry: Option<String> = conn
                .blmove(
                    &ready,
                    &processing,
                    Direction::Right,
                    Direction::Left,
                    RECEIVE_POLL.as_secs_f64(),
                )
                .await
                .map_err(|e| StoreError::Queue(e.to_string()))?;

            let Some(entry) = entry else {
                continue;
            };

            match serde_json::from_str::<Envelope>(&entry) {
                Ok(envelope) => return Ok(envelope.into_delivery(entry)),
                Err(e) => {
                    tracing::warn!(queue = %queue, error = %e, "Dead-lettering unreadable queue entry");
                    let dead = DeadLetter {
                        id: String::new(),
                        body: entry.clone(),
                        attempt: 1,
                        reason: format!("unreadable envelope: {e}"),
                        failed_at: chrono::Utc::now(),
                    };
                    self.settle(queue, &entry, Some((Self::dead_key(queue), Self::encode(&dead)?)))
                        .await?;
                }
            }
        }
    }

    async fn ack(&self, queue: &str, delivery: &Delivery) -> Result<()> {
        self.settle(queue, &delivery.receipt, None).await
    }

    async fn nack(&self, queue: &str, delivery: &Delivery, requeue: bool) -> Result<()> {
        let push = if requeue {
            let next = Self::decode_receipt(delivery)?.redelivery();
            Some((Self::ready_key(queue), Self::encode(&next)?))
        } else {
            None
        };
        self.settle(queue, &delivery.receipt, push).await
    }

    async fn dead_letter(&self, queue: &str, delivery: &Delivery, reason: &str) -> Result<()> {
        let dead = Self::decode_receipt(delivery)?.into_dead_letter(reason);
        self.settle(queue, &delivery.receipt, Some((Self::dead_key(queue), Self::encode(&dead)?)))
            .await
    }

    async fn recover_unacked(&self, queue: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let recovered: usize = self
            .recover
            .key(Self::processing_key(queue))
            .key(Self::ready_key(queue))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Queue(e.to_string()))?;

        if recovered > 0 {
            tracing::info!(queue = %queue, recovered, "Requeued unacknowledged messages");
        }
        Ok(recovered)
    }

    async fn pending(&self, queue: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn
            .llen(Self::ready_key(queue))
            .await
            .map_err(|e| StoreError::Queue(e.to_string()))?;
        Ok(len)
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>> {
        let mut conn = self.conn.clone();
        let entries: Vec<String> = conn
            .lrange(Self::dead_key(queue), 0, -1)
            .await
            .map_err(|e| StoreError::Queue(e.to_string()))?;

        entries
            .iter()
            .map(|entry| {
                serde_json::from_str(entry)
                    .map_err(|e| StoreError::Queue(format!("corrupt dead letter: {e}")))
            })
            .collect()
    }
}
