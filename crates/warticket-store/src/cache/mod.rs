//! Atomic integer counters with expiry.
//!
//! The stock ledger keeps one counter per event here. Decrements and increments only
//! apply to keys that already exist, so an expired counter is never recreated from zero
//! by a write; the caller re-hydrates it from the durable store instead.

mod memory;
mod redis;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Shortest expiry a counter is given; Redis `EX` counts whole seconds.
pub(crate) const MIN_TTL: Duration = Duration::from_secs(1);

/// A key/value cache of atomic integer counters.
#[async_trait]
pub trait CounterCache: Send + Sync {
    /// Whether a live counter exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Cache` if the backend is unreachable.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Read a counter, `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Cache` if the backend is unreachable.
    async fn get(&self, key: &str) -> Result<Option<i64>>;

    /// Set a counter with a TTL only if the key is absent.
    ///
    /// Returns `true` if this call created the key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Cache` if the backend is unreachable.
    async fn set_nx(&self, key: &str, value: i64, ttl: Duration) -> Result<bool>;

    /// Atomically subtract `by` from an existing counter and return the new value.
    ///
    /// Returns `None` without writing anything if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Cache` if the backend is unreachable.
    async fn decr_by_existing(&self, key: &str, by: i64) -> Result<Option<i64>>;

    /// Atomically add `by` to an existing counter and return the new value.
    ///
    /// Returns `None` without writing anything if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Cache` if the backend is unreachable.
    async fn incr_by_existing(&self, key: &str, by: i64) -> Result<Option<i64>>;
}
