//! Payment gateway webhook.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use warticket_store::crypto;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Payment notification payload.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    /// Booking code of the paid order.
    pub booking_id: String,
    /// Gateway payment status, e.g. `PAID` or `SETTLEMENT`.
    pub payment_status: String,
}

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
    /// What the notification did: `ignored`, `already_processed` or `enqueued`.
    pub outcome: &'static str,
}

/// Handle payment notifications.
///
/// Errors are returned to the gateway, which redelivers; confirmation is idempotent.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.payment_webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing webhook signature".into()))?;

        if !crypto::verify_hex(secret.as_bytes(), body.as_bytes(), signature) {
            tracing::warn!("Invalid payment webhook signature");
            return Err(ApiError::BadRequest("Invalid webhook signature".into()));
        }
    }

    let webhook: PaymentWebhook =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        booking_id = %webhook.booking_id,
        payment_status = %webhook.payment_status,
        "Received payment webhook"
    );

    // The booking code is only validated for paid signals; anything else is a no-op
    let outcome = state
        .payments
        .confirm(&webhook.booking_id, &webhook.payment_status)
        .await?;

    Ok(Json(WebhookResponse {
        received: true,
        outcome: outcome.as_str(),
    }))
}
