//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use order_store::CheckoutStore;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

/// GET /health — reports whether the checkout store is reachable.
pub async fn check<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let store = state.coordinator.store();
    match store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                store: store.backend(),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, backend = store.backend(), "store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    store: store.backend(),
                }),
            )
        }
    }
}
