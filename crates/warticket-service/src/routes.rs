//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{blobs, health, orders, webhooks};
use crate::middleware::rate_limit;
use crate::state::AppState;

/// Maximum concurrent requests for the order API.
const API_MAX_CONCURRENT_REQUESTS: usize = 256;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /blobs/*key` - Signed artifact download
///
/// ## Orders (JWT auth, rate-limited per client address, concurrency-limited)
/// - `POST /v1/orders` - Reserve seats and create an order
/// - `GET /v1/orders` - List the caller's orders
/// - `GET /v1/orders/:booking_id` - Get one order with its tickets
///
/// ## Webhooks (optional HMAC signature)
/// - `POST /webhooks/payment` - Payment gateway notifications
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let api_routes = Router::new()
        .route(
            "/orders",
            post(orders::create_order).get(orders::list_orders),
        )
        .route("/orders/:booking_id", get(orders::get_order))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .layer(from_fn_with_state(Arc::clone(&state), rate_limit));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Signed by the payment gateway, so not rate limited
        .route("/webhooks/payment", post(webhooks::payment_webhook))
        // Artifacts (authorized by URL signature)
        .route("/blobs/*key", get(blobs::get_blob))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
