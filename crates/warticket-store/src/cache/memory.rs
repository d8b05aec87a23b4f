//! In-process counter cache.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{CounterCache, MIN_TTL};
use crate::error::Result;

struct Entry {
    value: i64,
    expires_at: Instant,
}

/// Counter cache held in process memory.
///
/// Expiry follows the tokio clock, so tests can use `tokio::time::pause` and `advance`.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let expired = entries
            .get(key)
            .is_some_and(|e| e.expires_at <= Instant::now());
        if expired {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl CounterCache for MemoryCache {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key).is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key).map(|e| e.value))
    }

    async fn set_nx(&self, key: &str, value: i64, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl.max(MIN_TTL),
            },
        );
        Ok(true)
    }

    async fn decr_by_existing(&self, key: &str, by: i64) -> Result<Option<i64>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key).map(|e| {
            e.value -= by;
            e.value
        }))
    }

    async fn incr_by_existing(&self, key: &str, by: i64) -> Result<Option<i64>> {
        let mut entries = self.entries.lock().await;
        Ok(Self::live(&mut entries, key).map(|e| {
            e.value += by;
            e.value
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_to_missing_keys_are_noops() {
        let cache = MemoryCache::new();

        assert_eq!(cache.decr_by_existing("k", 1).await.unwrap(), None);
        assert_eq!(cache.incr_by_existing("k", 1).await.unwrap(), None);
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_nx_only_sets_once() {
        let cache = MemoryCache::new();

        assert!(cache.set_nx("k", 10, Duration::from_secs(60)).await.unwrap());
        assert!(!cache.set_nx("k", 99, Duration::from_secs(60)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_keeps_the_key_for_a_second() {
        let cache = MemoryCache::new();
        cache.set_nx("k", 5, Duration::ZERO).await.unwrap();

        assert_eq!(cache.decr_by_existing("k", 2).await.unwrap(), Some(3));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn counters_can_go_negative() {
        let cache = MemoryCache::new();
        cache.set_nx("k", 1, Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.decr_by_existing("k", 3).await.unwrap(), Some(-2));
        assert_eq!(cache.incr_by_existing("k", 3).await.unwrap(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        cache.set_nx("k", 5, Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.decr_by_existing("k", 1).await.unwrap(), None);
        assert!(cache.set_nx("k", 7, Duration::from_secs(10)).await.unwrap());
    }
}
