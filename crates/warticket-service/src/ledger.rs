//! Stock ledger: cache-backed admission control for seat reservations.
//!
//! Each event has a counter `event_stock:<event_id>` in a shared [`CounterCache`]. A
//! reservation is a single atomic decrement; if the result is negative the decrement is
//! compensated and the reservation is refused. The counter is filled from the durable
//! store's `available_stock` on first use and after expiry, using set-if-absent so a late
//! hydration never overwrites a counter that concurrent reservations already decremented.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use warticket_core::{EventId, Result, TicketError};
use warticket_store::{CounterCache, Store};

/// Cache key prefix of the per-event stock counters.
pub const STOCK_KEY_PREFIX: &str = "event_stock:";

/// Hydrate-then-decrement rounds before giving up on a counter that keeps expiring.
const MAX_HYDRATION_ATTEMPTS: usize = 3;

/// Ledger key of an event.
#[must_use]
pub fn stock_key(event_id: &EventId) -> String {
    format!("{STOCK_KEY_PREFIX}{event_id}")
}

/// Admission control over a fixed per-event inventory.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Reserve `quantity` seats, returning the seats left afterwards.
    ///
    /// The returned count is informational; it is stale as soon as it is returned.
    ///
    /// # Errors
    ///
    /// - `TicketError::NotEnoughStock` if fewer than `quantity` seats remain.
    /// - `TicketError::EventNotFound` if the ledger needs hydration and the event does not exist.
    /// - `TicketError::Internal` if the cache or the durable store fails.
    async fn try_reserve(&self, event_id: &EventId, quantity: u32) -> Result<i64>;

    /// Give back seats taken by a reservation whose order was not committed.
    ///
    /// # Errors
    ///
    /// Returns `TicketError::Internal` if the cache fails.
    async fn release(&self, event_id: &EventId, quantity: u32) -> Result<()>;

    /// Fill the ledger from the durable store if the event has no live counter.
    ///
    /// # Errors
    ///
    /// - `TicketError::EventNotFound` if the event does not exist.
    /// - `TicketError::Internal` if the cache or the durable store fails.
    async fn hydrate(&self, event_id: &EventId) -> Result<()>;
}

/// [`StockLedger`] over a [`CounterCache`], hydrated from a [`Store`].
pub struct CachedStockLedger {
    cache: Arc<dyn CounterCache>,
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl CachedStockLedger {
    /// Create a ledger whose counters live for `ttl` after hydration.
    #[must_use]
    pub fn new(cache: Arc<dyn CounterCache>, store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { cache, store, ttl }
    }
}

#[async_trait]
impl StockLedger for CachedStockLedger {
    async fn try_reserve(&self, event_id: &EventId, quantity: u32) -> Result<i64> {
        if quantity == 0 {
            return Err(TicketError::InvalidQuantity(quantity));
        }

        let key = stock_key(event_id);
        let amount = i64::from(quantity);

        for attempt in 1..=MAX_HYDRATION_ATTEMPTS {
            self.hydrate(event_id).await?;

            let Some(remaining) = self
                .cache
                .decr_by_existing(&key, amount)
                .await
                .map_err(TicketError::internal)?
            else {
                // Counter expired between hydration and decrement
                tracing::debug!(event_id = %event_id, attempt, "Stock counter expired, re-hydrating");
                continue;
            };

            if remaining < 0 {
                self.cache
                    .incr_by_existing(&key, amount)
                    .await
                    .map_err(TicketError::internal)?;

                tracing::info!(
                    event_id = %event_id,
                    requested = quantity,
                    "Reservation refused: not enough stock"
                );
                return Err(TicketError::NotEnoughStock {
                    event_id: *event_id,
                    requested: quantity,
                });
            }

            tracing::debug!(event_id = %event_id, quantity, remaining, "Seats reserved");
            return Ok(remaining);
        }

        Err(TicketError::Internal(format!(
            "stock counter for event {event_id} expired {MAX_HYDRATION_ATTEMPTS} times during reservation"
        )))
    }

    async fn release(&self, event_id: &EventId, quantity: u32) -> Result<()> {
        let restored = self
            .cache
            .incr_by_existing(&stock_key(event_id), i64::from(quantity))
            .await
            .map_err(TicketError::internal)?;

        match restored {
            Some(remaining) => {
                tracing::debug!(event_id = %event_id, quantity, remaining, "Seats released");
            }
            None => {
                // The next hydration reads the durable count, which never saw the seats
                tracing::debug!(event_id = %event_id, quantity, "Stock counter absent, nothing to release");
            }
        }
        Ok(())
    }

    async fn hydrate(&self, event_id: &EventId) -> Result<()> {
        let key = stock_key(event_id);

        if self.cache.exists(&key).await.map_err(TicketError::internal)? {
            return Ok(());
        }

        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| TicketError::EventNotFound {
                event_id: event_id.to_string(),
            })?;

        let won = self
            .cache
            .set_nx(&key, i64::from(event.available_stock), self.ttl)
            .await
            .map_err(TicketError::internal)?;

        if won {
            tracing::debug!(
                event_id = %event_id,
                available_stock = event.available_stock,
                "Stock counter hydrated"
            );
        } else {
            tracing::debug!(event_id = %event_id, "Stock counter hydrated concurrently");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Utc;
    use warticket_core::Event;
    use warticket_store::{MemoryCache, MemoryStore, StoreError};

    use super::*;

    const TTL: Duration = Duration::from_secs(3600);

    async fn setup(total_stock: u32) -> (CachedStockLedger, Arc<MemoryCache>, Event) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let event = Event::new("Gig", "Hall A", Utc::now(), 2_500, total_stock);
        store.put_event(&event).await.unwrap();

        let ledger = CachedStockLedger::new(cache.clone(), store, TTL);
        (ledger, cache, event)
    }

    #[tokio::test]
    async fn hydration_then_reserve_yields_v_minus_q() {
        let (ledger, cache, event) = setup(10).await;

        let remaining = ledger.try_reserve(&event.id, 3).await.unwrap();

        assert_eq!(remaining, 7);
        assert_eq!(cache.get(&stock_key(&event.id)).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn zero_ttl_still_admits_reservations() {
        let store = Arc::new(MemoryStore::new());
        let event = Event::new("Gig", "Hall A", Utc::now(), 2_500, 5);
        store.put_event(&event).await.unwrap();
        let ledger = CachedStockLedger::new(Arc::new(MemoryCache::new()), store, Duration::ZERO);

        assert_eq!(ledger.try_reserve(&event.id, 2).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn refused_reservation_leaves_counter_unchanged() {
        let (ledger, cache, event) = setup(2).await;

        let err = ledger.try_reserve(&event.id, 3).await.unwrap_err();

        assert!(matches!(err, TicketError::NotEnoughStock { requested: 3, .. }));
        assert_eq!(cache.get(&stock_key(&event.id)).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn unknown_event_is_not_found() {
        let (ledger, cache, _) = setup(2).await;
        let missing = EventId::generate();

        let err = ledger.try_reserve(&missing, 1).await.unwrap_err();

        assert!(matches!(err, TicketError::EventNotFound { .. }));
        assert!(!cache.exists(&stock_key(&missing)).await.unwrap());
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let (ledger, _, event) = setup(2).await;
        let err = ledger.try_reserve(&event.id, 0).await.unwrap_err();
        assert!(matches!(err, TicketError::InvalidQuantity(0)));
    }

    #[tokio::test]
    async fn hydration_does_not_overwrite_live_counter() {
        let (ledger, cache, event) = setup(10).await;
        cache.set_nx(&stock_key(&event.id), 4, TTL).await.unwrap();

        let remaining = ledger.try_reserve(&event.id, 1).await.unwrap();

        assert_eq!(remaining, 3);
    }

    #[tokio::test]
    async fn release_restores_seats() {
        let (ledger, cache, event) = setup(5).await;
        ledger.try_reserve(&event.id, 2).await.unwrap();

        ledger.release(&event.id, 2).await.unwrap();

        assert_eq!(cache.get(&stock_key(&event.id)).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn release_without_counter_is_noop() {
        let (ledger, cache, event) = setup(5).await;

        ledger.release(&event.id, 2).await.unwrap();

        assert!(!cache.exists(&stock_key(&event.id)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_counter_rehydrates_from_durable_count() {
        let (ledger, cache, event) = setup(5).await;
        ledger.try_reserve(&event.id, 2).await.unwrap();

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert!(!cache.exists(&stock_key(&event.id)).await.unwrap());

        // No order was committed, so the durable count is still 5
        let remaining = ledger.try_reserve(&event.id, 1).await.unwrap();
        assert_eq!(remaining, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_reservations_never_oversell() {
        let (ledger, _, event) = setup(10).await;
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move { ledger.try_reserve(&event.id, 1).await })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => granted += 1,
                Err(TicketError::NotEnoughStock { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(granted, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_seat_goes_to_exactly_one_caller() {
        let (ledger, cache, event) = setup(1).await;
        let ledger = Arc::new(ledger);

        let a = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.try_reserve(&event.id, 1).await })
        };
        let b = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.try_reserve(&event.id, 1).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(cache.get(&stock_key(&event.id)).await.unwrap(), Some(0));
    }

    /// Cache whose first conditional decrement behaves as if the key just expired.
    struct ExpiringOnce {
        inner: MemoryCache,
        expired: AtomicBool,
    }

    #[async_trait]
    impl CounterCache for ExpiringOnce {
        async fn exists(&self, key: &str) -> warticket_store::Result<bool> {
            self.inner.exists(key).await
        }

        async fn get(&self, key: &str) -> warticket_store::Result<Option<i64>> {
            self.inner.get(key).await
        }

        async fn set_nx(&self, key: &str, value: i64, ttl: Duration) -> warticket_store::Result<bool> {
            self.inner.set_nx(key, value, ttl).await
        }

        async fn decr_by_existing(&self, key: &str, by: i64) -> warticket_store::Result<Option<i64>> {
            if !self.expired.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.decr_by_existing(key, by).await
        }

        async fn incr_by_existing(&self, key: &str, by: i64) -> warticket_store::Result<Option<i64>> {
            self.inner.incr_by_existing(key, by).await
        }
    }

    #[tokio::test]
    async fn expiry_mid_flight_is_retried() {
        let store = Arc::new(MemoryStore::new());
        let event = Event::new("Gig", "Hall A", Utc::now(), 2_500, 6);
        store.put_event(&event).await.unwrap();
        let cache = Arc::new(ExpiringOnce {
            inner: MemoryCache::new(),
            expired: AtomicBool::new(false),
        });
        let ledger = CachedStockLedger::new(cache.clone(), store, TTL);

        let remaining = ledger.try_reserve(&event.id, 2).await.unwrap();

        assert_eq!(remaining, 4);
        assert_eq!(cache.get(&stock_key(&event.id)).await.unwrap(), Some(4));
    }

    /// Store that is down.
    struct UnavailableStore;

    #[async_trait]
    impl Store for UnavailableStore {
        async fn put_event(&self, _: &Event) -> warticket_store::Result<()> {
            Err(StoreError::Database("down".into()))
        }
        async fn get_event(&self, _: &EventId) -> warticket_store::Result<Option<Event>> {
            Err(StoreError::Database("down".into()))
        }
        async fn create_order(&self, _: &warticket_core::Order) -> warticket_store::Result<Event> {
            Err(StoreError::Database("down".into()))
        }
        async fn get_order_by_booking(
            &self,
            _: &warticket_core::BookingCode,
        ) -> warticket_store::Result<Option<warticket_core::OrderDetails>> {
            Err(StoreError::Database("down".into()))
        }
        async fn list_orders_by_user(
            &self,
            _: &warticket_core::UserId,
        ) -> warticket_store::Result<Vec<warticket_core::OrderDetails>> {
            Err(StoreError::Database("down".into()))
        }
        async fn transition_order_status(
            &self,
            _: &warticket_core::BookingCode,
            _: warticket_core::OrderStatus,
            _: warticket_core::OrderStatus,
        ) -> warticket_store::Result<bool> {
            Err(StoreError::Database("down".into()))
        }
        async fn insert_ticket(&self, _: &warticket_core::Ticket) -> warticket_store::Result<()> {
            Err(StoreError::Database("down".into()))
        }
        async fn list_tickets_for_order(
            &self,
            _: &warticket_core::OrderId,
        ) -> warticket_store::Result<Vec<warticket_core::Ticket>> {
            Err(StoreError::Database("down".into()))
        }
    }

    #[tokio::test]
    async fn store_outage_during_hydration_fails_without_partial_state() {
        let cache = Arc::new(MemoryCache::new());
        let ledger = CachedStockLedger::new(cache.clone(), Arc::new(UnavailableStore), TTL);
        let event_id = EventId::generate();

        let err = ledger.try_reserve(&event_id, 1).await.unwrap_err();

        assert!(matches!(err, TicketError::Internal(_)));
        assert!(!cache.exists(&stock_key(&event_id)).await.unwrap());
    }
}
