//! HTTP API server with observability for the checkout system.
//!
//! Provides REST endpoints for placing orders and managing product stock,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{CheckoutConfig, CheckoutCoordinator};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::CheckoutStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CheckoutStore> {
    pub coordinator: CheckoutCoordinator<S>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CheckoutStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/orders", post(routes::orders::place::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/by-number/{number}",
            get(routes::orders::get_by_number::<S>),
        )
        .route(
            "/orders/{id}/status",
            post(routes::orders::change_status::<S>),
        )
        .route("/products", post(routes::products::create::<S>))
        .route(
            "/products/{id}",
            get(routes::products::get::<S>).put(routes::products::update::<S>),
        )
        .route(
            "/products/{id}/restock",
            post(routes::products::restock::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a checkout store.
pub fn create_default_state<S: CheckoutStore + 'static>(
    store: S,
    config: CheckoutConfig,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        coordinator: CheckoutCoordinator::new(store, config),
    })
}
