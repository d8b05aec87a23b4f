//! Application state.

use std::sync::Arc;

use warticket_store::{BlobStore, CounterCache, JobQueue, MemoryRateLimiter, RateLimiter, Store};

use crate::config::ServiceConfig;
use crate::ledger::{CachedStockLedger, StockLedger};
use crate::orders::OrderService;
use crate::payments::PaymentConfirmation;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: ServiceConfig,

    /// The durable store.
    pub store: Arc<dyn Store>,

    /// The fulfillment queue backend.
    pub queue: Arc<dyn JobQueue>,

    /// Artifact storage.
    pub blobs: Arc<dyn BlobStore>,

    /// Stock ledger in front of the durable stock counts.
    pub ledger: Arc<dyn StockLedger>,

    /// Order placement and queries.
    pub orders: Arc<OrderService>,

    /// Payment confirmation handler.
    pub payments: Arc<PaymentConfirmation>,

    /// Per-client request limits for the order API.
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    /// Wire the services over the given backends.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn Store>,
        cache: Arc<dyn CounterCache>,
        queue: Arc<dyn JobQueue>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let ledger: Arc<dyn StockLedger> = Arc::new(CachedStockLedger::new(
            cache,
            Arc::clone(&store),
            config.stock_cache_ttl,
        ));

        let orders = Arc::new(OrderService::new(
            Arc::clone(&ledger),
            Arc::clone(&store),
            Arc::clone(&blobs),
            config.signed_url_ttl,
        ));

        let payments = Arc::new(PaymentConfirmation::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            config.fulfillment_queue.clone(),
        ));

        if config.payment_webhook_secret.is_none() {
            tracing::warn!("PAYMENT_WEBHOOK_SECRET not set - payment webhooks are not authenticated");
        }

        Self {
            config,
            store,
            queue,
            blobs,
            ledger,
            orders,
            payments,
            rate_limiter: Arc::new(MemoryRateLimiter::new()),
        }
    }

    /// Replace the in-process rate limiter, e.g. with one shared through Redis.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}
