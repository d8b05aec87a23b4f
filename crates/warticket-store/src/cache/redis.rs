//! Redis-backed counter cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use super::{CounterCache, MIN_TTL};
use crate::error::{Result, StoreError};

/// Add ARGV[1] to KEYS[1] only if the key exists; nil otherwise.
const INCR_EXISTING_LUA: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCRBY', KEYS[1], ARGV[1])
end
return false
";

/// Counter cache on a shared Redis instance.
///
/// Conditional updates run as Lua scripts so the existence check and the
/// increment are a single atomic step, and an expired counter keeps its
/// absence instead of restarting at `-n`.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    incr_existing: Script,
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Cache` if the URL is invalid or the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Cache(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Cache(format!("failed to connect to redis: {e}")))?;

        Ok(Self::with_connection(conn))
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            incr_existing: Script::new(INCR_EXISTING_LUA),
        }
    }

    async fn add_existing(&self, key: &str, by: i64) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = self
            .incr_existing
            .key(key)
            .arg(by)
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl CounterCache for RedisCache {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_nx(&self, key: &str, value: i64, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.max(MIN_TTL).as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn decr_by_existing(&self, key: &str, by: i64) -> Result<Option<i64>> {
        self.add_existing(key, -by).await
    }

    async fn incr_by_existing(&self, key: &str, by: i64) -> Result<Option<i64>> {
        self.add_existing(key, by).await
    }
}
