//! Authentication extractor.
//!
//! Requests carry `Authorization: Bearer <JWT>`. Tokens are HS256-signed with the
//! configured secret and carry the user's UUID in `sub`.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use warticket_core::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// An authenticated user extracted from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized)?;

        let claims = verify_token(token, &state.config.jwt_secret).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            ApiError::Unauthorized
        })?;

        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(AuthUser { user_id })
    }
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    pub iat: i64,
}

/// Validate an HS256 token and return its claims.
///
/// # Errors
///
/// Returns an error if the signature is invalid or the token has expired.
pub fn verify_token(token: &str, secret: &str) -> jsonwebtoken::errors::Result<JwtClaims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<JwtClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
}

/// Issue an HS256 token for `user_id`, valid for `ttl_seconds`.
///
/// # Errors
///
/// Returns an error if the token cannot be encoded.
pub fn issue_token(
    user_id: &UserId,
    secret: &str,
    ttl_seconds: i64,
) -> jsonwebtoken::errors::Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        sub: user_id.to_string(),
        exp: now + ttl_seconds,
        iat: now,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
