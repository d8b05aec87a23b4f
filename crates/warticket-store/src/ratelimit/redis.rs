//! Redis-backed rate limiter.
//!
//! Each key is a sorted set of hit timestamps (milliseconds). A Lua script trims
//! entries older than the window, counts the rest and only then adds the new hit,
//! so concurrent requests from several service instances cannot overshoot the limit.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use super::{rate_limit_key, RateDecision, RateLimiter};
use crate::error::{Result, StoreError};

/// KEYS[1] set, ARGV: now ms, window ms, limit, unique member.
/// Returns {1, remaining} or {0, retry_after_ms}.
const SLIDING_WINDOW_LUA: &str = r"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local used = redis.call('ZCARD', KEYS[1])
if used >= limit then
    local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
    local retry = window
    if oldest[2] then
        retry = tonumber(oldest[2]) + window - now
    end
    return {0, retry}
end
redis.call('ZADD', KEYS[1], now, ARGV[4])
redis.call('PEXPIRE', KEYS[1], window)
return {1, limit - used - 1}
";

/// Rate limiter shared by every instance pointed at the same Redis.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    sliding_window: Script,
}

impl RedisRateLimiter {
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
            sliding_window: Script::new(SLIDING_WINDOW_LUA),
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_and_record(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateDecision> {
        let mut conn = self.conn.clone();
        let now = now_ms();
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1);
        let member = format!("{now}-{}", uuid::Uuid::new_v4().simple());

        let (allowed, value): (i64, i64) = self
            .sliding_window
            .key(rate_limit_key(key))
            .arg(now)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        let value = u64::try_from(value).unwrap_or(0);
        if allowed == 1 {
            Ok(RateDecision::Allowed {
                remaining: u32::try_from(value).unwrap_or(u32::MAX),
            })
        } else {
            Ok(RateDecision::Limited {
                retry_after: Duration::from_millis(value),
            })
        }
    }
}
