//! Signed artifact downloads.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Signed URL parameters.
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    /// Unix expiry time.
    pub expires: i64,
    /// Hex HMAC over `<key>:<expires>`.
    pub signature: String,
}

/// Serve a blob if the URL signature is valid and unexpired.
pub async fn get_blob(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = key.trim_start_matches('/');

    if !state.blobs.verify_signed(key, query.expires, &query.signature) {
        tracing::debug!(key = %key, "Rejected blob URL");
        return Err(ApiError::Unauthorized);
    }

    let blob = state
        .blobs
        .get(key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("blob not found: {key}")))?;

    Ok(([(header::CONTENT_TYPE, blob.content_type)], blob.bytes))
}
