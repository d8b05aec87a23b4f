//! API error types and responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use warticket_core::TicketError;
use warticket_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not enough seats left for the requested quantity.
    #[error("not enough stock for event {event_id}")]
    NotEnoughStock {
        /// The event.
        event_id: String,
        /// Seats requested.
        requested: u32,
    },

    /// The client exceeded its request rate.
    #[error("too many requests")]
    TooManyRequests {
        /// Seconds until another request is admitted.
        retry_after_seconds: u64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::NotEnoughStock {
                event_id,
                requested,
            } => (
                StatusCode::CONFLICT,
                "not_enough_stock",
                self.to_string(),
                Some(serde_json::json!({
                    "event_id": event_id,
                    "requested": requested
                })),
            ),
            Self::TooManyRequests {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                "too_many_requests",
                self.to_string(),
                Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::TooManyRequests {
            retry_after_seconds,
        } = self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_seconds));
        }
        response
    }
}

impl From<TicketError> for ApiError {
    fn from(err: TicketError) -> Self {
        match err {
            TicketError::NotEnoughStock {
                event_id,
                requested,
            } => Self::NotEnoughStock {
                event_id: event_id.to_string(),
                requested,
            },
            TicketError::EventNotFound { .. } | TicketError::OrderNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            TicketError::InvalidQuantity(_) | TicketError::InvalidId(_) => {
                Self::BadRequest(err.to_string())
            }
            TicketError::InvalidTransition { .. } => Self::Conflict(err.to_string()),
            TicketError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        TicketError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warticket_core::EventId;

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (
                TicketError::NotEnoughStock {
                    event_id: EventId::generate(),
                    requested: 2,
                },
                StatusCode::CONFLICT,
            ),
            (
                TicketError::OrderNotFound {
                    booking_id: "WT-X".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (TicketError::InvalidQuantity(0), StatusCode::BAD_REQUEST),
            (TicketError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
