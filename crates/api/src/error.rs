//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout coordinator error.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    let status = checkout_status(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "internal server error");
    }
    (status, err.to_string())
}

/// Maps a checkout error to its HTTP status.
pub fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::ProductNotFound(_) | CheckoutError::OrderNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        CheckoutError::InsufficientStock { .. } | CheckoutError::TotalsMismatch { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CheckoutError::InvalidCart(_) | CheckoutError::InvalidProduct(_) => StatusCode::BAD_REQUEST,
        CheckoutError::DuplicateOrderNumber(_)
        | CheckoutError::ProductExists(_)
        | CheckoutError::InvalidStatusTransition { .. }
        | CheckoutError::WriteConflict { .. } => StatusCode::CONFLICT,
        CheckoutError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}
