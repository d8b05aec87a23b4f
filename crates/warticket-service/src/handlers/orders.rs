//! Order handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use warticket_core::{BookingCode, EventId, TicketError};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::orders::OrderView;
use crate::state::AppState;

/// Request to buy seats for an event.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// The event.
    pub event_id: EventId,
    /// Seats to buy (at least 1).
    pub quantity: u32,
}

/// Order list response.
#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    /// The caller's orders, newest first.
    pub orders: Vec<OrderView>,
}

/// Reserve seats and create a PENDING order.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderView>), ApiError> {
    let order = state
        .orders
        .create_order(auth.user_id, request.event_id, request.quantity)
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// List the caller's orders.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<OrderListResponse>, ApiError> {
    let orders = state.orders.list_orders(&auth.user_id).await?;
    Ok(Json(OrderListResponse { orders }))
}

/// Get one of the caller's orders by booking code, with ticket download links.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(booking_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let booking_id = booking_id
        .parse::<BookingCode>()
        .map_err(TicketError::from)?;

    let order = state
        .orders
        .get_order_by_booking(&booking_id, &auth.user_id)
        .await?;

    Ok(Json(order))
}
