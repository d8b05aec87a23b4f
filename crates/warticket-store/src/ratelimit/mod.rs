//! Sliding-window request rate limiting.
//!
//! A key (typically the client address) may record at most `limit` hits within any
//! `window`. Rejected hits are not recorded, so a client that backs off regains
//! capacity as soon as its oldest hit leaves the window.

mod memory;
mod redis;

pub use self::memory::MemoryRateLimiter;
pub use self::redis::RedisRateLimiter;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The hit was recorded.
    Allowed {
        /// Hits still available in the current window.
        remaining: u32,
    },
    /// The key is over its limit; nothing was recorded.
    Limited {
        /// Time until the oldest hit leaves the window.
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Whether the hit was admitted.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// A shared sliding-window rate limiter.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record a hit for `key` unless it already has `limit` hits within `window`.
    ///
    /// The check and the record are one atomic step.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Cache` if the backend is unreachable.
    async fn check_and_record(&self, key: &str, limit: u32, window: Duration)
        -> Result<RateDecision>;
}

fn rate_limit_key(key: &str) -> String {
    format!("rate_limit:{key}")
}
