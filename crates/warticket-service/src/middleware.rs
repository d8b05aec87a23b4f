//! Request middleware.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use warticket_store::RateDecision;

use crate::error::ApiError;
use crate::state::AppState;

/// Limit each client address to `rate_limit_requests` per `rate_limit_window`.
///
/// A rate limiter that cannot be reached lets the request through.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = state.config.rate_limit_requests;
    if limit == 0 {
        return Ok(next.run(request).await);
    }

    let client = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );

    match state
        .rate_limiter
        .check_and_record(&client, limit, state.config.rate_limit_window)
        .await
    {
        Ok(RateDecision::Allowed { .. }) => {}
        Ok(RateDecision::Limited { retry_after }) => {
            tracing::debug!(client = %client, "Rate limit exceeded");
            // Round up so a client honoring Retry-After is not rejected again
            let retry_after_seconds =
                retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            return Err(ApiError::TooManyRequests {
                retry_after_seconds: retry_after_seconds.max(1),
            });
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rate limiter unavailable, admitting request");
        }
    }

    Ok(next.run(request).await)
}

/// The first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
    };

    forwarded
        .or_else(real_ip)
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip()))
        .map_or_else(|| "unknown".to_string(), |ip| ip.to_string())
}
