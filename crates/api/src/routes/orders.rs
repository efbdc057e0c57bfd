//! Checkout and order read-back endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{Order, OrderNumber, OrderStatus, PlaceOrder};
use order_store::CheckoutStore;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct StatusChangeRequest {
    pub status: OrderStatus,
}

// -- Handlers --

/// POST /orders — place an order for the submitted cart.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
pub async fn place<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<PlaceOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.coordinator.place_order(req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id} — load an order by ID.
#[tracing::instrument(skip(state))]
pub async fn get<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .coordinator
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(order))
}

/// GET /orders/by-number/{number} — load an order by its order number.
#[tracing::instrument(skip(state))]
pub async fn get_by_number<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(number): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_number = OrderNumber::parse(number.as_str())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let order = state
        .coordinator
        .get_order_by_number(&order_number)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {number} not found")))?;

    Ok(Json(order))
}

/// POST /orders/{id}/status — move an order to a new status.
#[tracing::instrument(skip(state, req))]
pub async fn change_status<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusChangeRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .coordinator
        .transition_status(order_id, req.status)
        .await?;

    Ok(Json(order))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(OrderId::from(uuid))
}
