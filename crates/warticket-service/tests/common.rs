//! Common test utilities for warticket integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_test::TestServer;
use chrono::Utc;

use warticket_core::{Event, UserId, FULFILLMENT_QUEUE};
use warticket_service::auth::issue_token;
use warticket_service::{
    create_router, AppState, PdfTicketRenderer, RetryPolicy, ServiceConfig, TicketRenderer,
    TicketWorker,
};
use warticket_store::{BlobStore, MemoryBlobStore, MemoryCache, MemoryQueue, MemoryStore, Store, UrlSigner};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const PUBLIC_BASE_URL: &str = "http://tickets.test";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Backends, shared with the router.
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub queue: Arc<MemoryQueue>,
    pub blobs: Arc<MemoryBlobStore>,
    /// The configuration the router was built with.
    pub config: ServiceConfig,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a new test harness over fresh in-memory backends.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a harness with a customised configuration.
    pub fn with_config(config: ServiceConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let queue = Arc::new(MemoryQueue::new());
        let blobs = Arc::new(MemoryBlobStore::new(UrlSigner::new(
            config.blob_signing_secret.as_bytes(),
            config.public_base_url.clone(),
        )));

        let state = AppState::new(
            config.clone(),
            store.clone(),
            cache.clone(),
            queue.clone(),
            blobs.clone(),
        );
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            cache,
            queue,
            blobs,
            config,
            test_user_id: UserId::generate(),
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        Self::auth_header_for(&self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        Self::auth_header_for(&UserId::generate())
    }

    /// Authorization header for a specific user.
    pub fn auth_header_for(user_id: &UserId) -> String {
        let token = issue_token(user_id, JWT_SECRET, 3600).expect("Failed to issue token");
        format!("Bearer {token}")
    }

    /// Store an event with `total_stock` seats.
    pub async fn seed_event(&self, total_stock: u32) -> Event {
        let event = Event::new(
            "Rock Festival",
            "Gelora Bung Karno",
            Utc::now() + chrono::Duration::days(30),
            75_000,
            total_stock,
        );
        self.store
            .put_event(&event)
            .await
            .expect("Failed to seed event");
        event
    }

    /// Worker over the harness backends with near-zero backoff.
    pub fn worker(&self, max_attempts: u32) -> TicketWorker {
        self.worker_with_blobs(self.blobs.clone(), max_attempts)
    }

    /// Worker over the harness store and queue with a custom blob store.
    pub fn worker_with_blobs(&self, blobs: Arc<dyn BlobStore>, max_attempts: u32) -> TicketWorker {
        self.worker_with_policy(
            blobs,
            RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5)),
        )
    }

    /// Worker with a custom blob store and retry policy.
    pub fn worker_with_policy(&self, blobs: Arc<dyn BlobStore>, retry: RetryPolicy) -> TicketWorker {
        TicketWorker::new(
            self.store.clone(),
            self.queue.clone(),
            blobs,
            Arc::new(PdfTicketRenderer::new()),
            FULFILLMENT_QUEUE,
            retry,
        )
    }

    /// Worker over the harness backends with a custom renderer.
    pub fn worker_with_renderer(&self, renderer: Arc<dyn TicketRenderer>) -> TicketWorker {
        TicketWorker::new(
            self.store.clone(),
            self.queue.clone(),
            self.blobs.clone(),
            renderer,
            FULFILLMENT_QUEUE,
            RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(5)),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration used by the harness.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        public_base_url: PUBLIC_BASE_URL.into(),
        jwt_secret: JWT_SECRET.into(),
        blob_signing_secret: "test-blob-secret".into(),
        ..ServiceConfig::default()
    }
}

/// Split a signed blob URL into its path, `expires` and `signature`.
pub fn split_signed_url(url: &str) -> (String, String, String) {
    let rest = url
        .strip_prefix(PUBLIC_BASE_URL)
        .expect("URL is not rooted at the public base URL");
    let (path, query) = rest.split_once('?').expect("URL has no query");

    let mut expires = String::new();
    let mut signature = String::new();
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("expires", v)) => expires = v.to_string(),
            Some(("signature", v)) => signature = v.to_string(),
            _ => {}
        }
    }
    (path.to_string(), expires, signature)
}
