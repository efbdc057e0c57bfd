//! Product catalog and restock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::{NewProduct, Product, ProductDetails, SizeCode};
use order_store::CheckoutStore;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct RestockRequest {
    pub size: SizeCode,
    pub units: u32,
}

/// POST /products — create a product.
#[tracing::instrument(skip(state, req), fields(product_id = %req.id))]
pub async fn create<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.coordinator.create_product(req).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products/{id} — load a product with its live stock.
#[tracing::instrument(skip(state))]
pub async fn get<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .coordinator
        .get_product(&ProductId::new(id.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    Ok(Json(product))
}

/// PUT /products/{id} — replace a product's name, image and prices.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ProductDetails>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .coordinator
        .update_product_details(&ProductId::new(id), req)
        .await?;

    Ok(Json(product))
}

/// POST /products/{id}/restock — add units of one size.
#[tracing::instrument(skip(state, req))]
pub async fn restock<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .coordinator
        .restock(&ProductId::new(id), &req.size, req.units)
        .await?;

    Ok(Json(product))
}
