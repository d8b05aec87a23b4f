//! Redis cache, queue and rate limiter against a real Redis.
//!
//! These tests are marked `#[ignore]` because they need a running Docker daemon.
//! Run them with:
//!
//! ```bash
//! cargo test -p warticket-store --test redis -- --ignored
//! ```

#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::redis::Redis;

use warticket_store::{
    CounterCache, JobQueue, OutgoingMessage, RateLimiter, RedisCache, RedisQueue,
    RedisRateLimiter,
};

const Q: &str = "ticket-jobs";

async fn setup() -> (ContainerAsync<Redis>, String) {
    let container = Redis::default()
        .start()
        .await
        .expect("Failed to start redis container");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get redis port");
    (container, format!("redis://127.0.0.1:{port}"))
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn decrement_of_absent_counter_creates_nothing() {
    let (_container, url) = setup().await;
    let cache = RedisCache::connect(&url).await.unwrap();

    assert_eq!(cache.decr_by_existing("stock:missing", 2).await.unwrap(), None);
    assert_eq!(cache.incr_by_existing("stock:missing", 2).await.unwrap(), None);
    assert!(!cache.exists("stock:missing").await.unwrap());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn counters_are_created_once_and_updated_in_place() {
    let (_container, url) = setup().await;
    let cache = RedisCache::connect(&url).await.unwrap();
    let ttl = Duration::from_secs(60);

    assert!(cache.set_nx("stock:e1", 5, ttl).await.unwrap());
    assert!(!cache.set_nx("stock:e1", 9, ttl).await.unwrap());

    assert_eq!(cache.decr_by_existing("stock:e1", 3).await.unwrap(), Some(2));
    assert_eq!(cache.incr_by_existing("stock:e1", 1).await.unwrap(), Some(3));
    assert_eq!(cache.get("stock:e1").await.unwrap(), Some(3));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn zero_ttl_counter_still_lives_briefly() {
    let (_container, url) = setup().await;
    let cache = RedisCache::connect(&url).await.unwrap();

    assert!(cache.set_nx("stock:e2", 4, Duration::ZERO).await.unwrap());
    assert_eq!(cache.get("stock:e2").await.unwrap(), Some(4));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn requeue_and_recovery_bump_the_attempt() {
    let (_container, url) = setup().await;
    let queue = RedisQueue::connect(&url).await.unwrap();
    queue.declare(Q).await.unwrap();
    queue.publish(Q, OutgoingMessage::json("job")).await.unwrap();

    let first = queue.receive(Q).await.unwrap();
    assert_eq!(first.attempt, 1);
    queue.nack(Q, &first, true).await.unwrap();

    let second = queue.receive(Q).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.attempt, 2);

    // Left unacknowledged, as by a crashed consumer
    assert_eq!(queue.recover_unacked(Q).await.unwrap(), 1);
    let third = queue.receive(Q).await.unwrap();
    assert_eq!(third.id, first.id);
    assert_eq!(third.attempt, 3);

    queue.ack(Q, &third).await.unwrap();
    assert_eq!(queue.recover_unacked(Q).await.unwrap(), 0);
    assert_eq!(queue.pending(Q).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn dead_letters_keep_the_reason() {
    let (_container, url) = setup().await;
    let queue = RedisQueue::connect(&url).await.unwrap();
    queue.publish(Q, OutgoingMessage::json("poison")).await.unwrap();

    let delivery = queue.receive(Q).await.unwrap();
    queue.dead_letter(Q, &delivery, "render failed").await.unwrap();

    let dead = queue.dead_letters(Q).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, delivery.id);
    assert_eq!(dead[0].reason, "render failed");
    assert_eq!(queue.recover_unacked(Q).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn waiting_consumer_does_not_stall_publishers() {
    let (_container, url) = setup().await;
    let queue = Arc::new(RedisQueue::connect(&url).await.unwrap());

    let consumer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.receive(Q).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The consumer is parked in a blocking pop; publishing must not queue behind it
    tokio::time::timeout(
        Duration::from_millis(500),
        queue.publish(Q, OutgoingMessage::json("late")),
    )
    .await
    .expect("publish stalled behind a blocking receive")
    .unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(3), consumer)
        .await
        .expect("consumer never woke")
        .unwrap()
        .unwrap();
    assert_eq!(delivery.body, "late");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn rate_limit_is_shared_through_redis() {
    let (_container, url) = setup().await;
    let first = RedisRateLimiter::connect(&url).await.unwrap();
    let second = RedisRateLimiter::connect(&url).await.unwrap();
    let window = Duration::from_secs(60);

    assert!(first.check_and_record("10.0.0.1", 2, window).await.unwrap().is_allowed());
    assert!(second.check_and_record("10.0.0.1", 2, window).await.unwrap().is_allowed());
    assert!(!first.check_and_record("10.0.0.1", 2, window).await.unwrap().is_allowed());
    assert!(second.check_and_record("10.0.0.2", 2, window).await.unwrap().is_allowed());
}
