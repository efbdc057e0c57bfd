//! Checkout error types.

use std::time::Duration;

use common::{Money, OrderId, ProductId};
use domain::{DomainError, OrderNumber, OrderStatus, SizeCode};
use order_store::StoreError;
use thiserror::Error;

/// Errors returned by the checkout coordinator.
///
/// Every variant means the unit of work was abandoned: no stock changed and
/// no order was written.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A referenced product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A requested size has fewer units than the cart asks for.
    #[error(
        "Insufficient stock for product {product_id} size {size}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        size: SizeCode,
        available: u32,
        requested: u32,
    },

    /// Concurrent writers kept winning; the caller may retry.
    #[error("Write conflict persisted after {attempts} attempt(s)")]
    WriteConflict { attempts: u32 },

    /// The cart itself is malformed.
    #[error("Invalid cart: {0}")]
    InvalidCart(DomainError),

    /// Product input is malformed.
    #[error("Invalid product: {0}")]
    InvalidProduct(DomainError),

    /// A product with this ID already exists.
    #[error("Product already exists: {0}")]
    ProductExists(ProductId),

    /// An order with this number already exists.
    #[error("Duplicate order number: {0}")]
    DuplicateOrderNumber(OrderNumber),

    /// Submitted totals disagree with the recomputed ones.
    #[error("Totals mismatch on {field}: submitted {submitted}, computed {computed}")]
    TotalsMismatch {
        field: &'static str,
        submitted: Money,
        computed: Money,
    },

    /// The order cannot move to the requested status.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Staging an attempt exceeded the configured timeout. Nothing was
    /// committed.
    #[error("Checkout attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The store failed for a reason unrelated to the request.
    #[error("Persistence error: {0}")]
    Persistence(StoreError),
}

impl CheckoutError {
    /// Returns true if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::WriteConflict { .. } | CheckoutError::Timeout(_)
        )
    }

    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::ProductNotFound(_) => "product_not_found",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::WriteConflict { .. } => "write_conflict",
            CheckoutError::InvalidCart(_) => "invalid_cart",
            CheckoutError::InvalidProduct(_) => "invalid_product",
            CheckoutError::ProductExists(_) => "product_exists",
            CheckoutError::DuplicateOrderNumber(_) => "duplicate_order_number",
            CheckoutError::TotalsMismatch { .. } => "totals_mismatch",
            CheckoutError::InvalidStatusTransition { .. } => "invalid_status_transition",
            CheckoutError::OrderNotFound(_) => "order_not_found",
            CheckoutError::Timeout(_) => "timeout",
            CheckoutError::Persistence(_) => "persistence",
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::ProductNotFound(id) => CheckoutError::ProductNotFound(id),
            DomainError::InsufficientStock {
                product_id,
                size,
                available,
                requested,
            } => CheckoutError::InsufficientStock {
                product_id,
                size,
                available,
                requested,
            },
            DomainError::TotalsMismatch {
                field,
                submitted,
                computed,
            } => CheckoutError::TotalsMismatch {
                field,
                submitted,
                computed,
            },
            DomainError::InvalidStatusTransition { from, to } => {
                CheckoutError::InvalidStatusTransition { from, to }
            }
            DomainError::InvalidPrice(_)
            | DomainError::InvalidStockCount { .. }
            | DomainError::StockOverflow { .. } => CheckoutError::InvalidProduct(e),
            other => CheckoutError::InvalidCart(other),
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(e: StoreError) -> Self {
        match e {
            // The retry loop replaces the attempt count.
            StoreError::WriteConflict { .. } | StoreError::StatusConflict { .. } => {
                CheckoutError::WriteConflict { attempts: 1 }
            }
            StoreError::DuplicateOrderNumber(number) => CheckoutError::DuplicateOrderNumber(number),
            StoreError::ProductExists(id) => CheckoutError::ProductExists(id),
            StoreError::ProductNotFound(id) => CheckoutError::ProductNotFound(id),
            StoreError::OrderNotFound(id) => CheckoutError::OrderNotFound(id),
            other => CheckoutError::Persistence(other),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
