//! In-process rate limiter.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{rate_limit_key, RateDecision, RateLimiter};
use crate::error::Result;

/// Tracked keys above which idle windows are swept on the next hit.
const SWEEP_THRESHOLD: usize = 10_000;

/// Rate limiter held in process memory; limits are per process.
///
/// Windows follow the tokio clock, so tests can use `tokio::time::pause` and `advance`.
#[derive(Default)]
pub struct MemoryRateLimiter {
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl MemoryRateLimiter {
    /// Create a limiter with no recorded hits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn expire(window_hits: &mut VecDeque<Instant>, cutoff: Option<Instant>) {
    let Some(cutoff) = cutoff else {
        return;
    };
    while window_hits.front().is_some_and(|hit| *hit <= cutoff) {
        window_hits.pop_front();
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check_and_record(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateDecision> {
        let now = Instant::now();
        let cutoff = now.checked_sub(window);
        let mut hits = self.hits.lock().await;

        if hits.len() > SWEEP_THRESHOLD {
            hits.retain(|_, window_hits| {
                expire(window_hits, cutoff);
                !window_hits.is_empty()
            });
        }

        let window_hits = hits.entry(rate_limit_key(key)).or_default();
        expire(window_hits, cutoff);

        let used = u32::try_from(window_hits.len()).unwrap_or(u32::MAX);
        if used >= limit {
            let retry_after = window_hits
                .front()
                .map_or(window, |oldest| (*oldest + window).saturating_duration_since(now));
            return Ok(RateDecision::Limited { retry_after });
        }

        window_hits.push_back(now);
        Ok(RateDecision::Allowed {
            remaining: limit - used - 1,
        })
    }
}
