use common::{OrderId, ProductId, Version};
use domain::{OrderNumber, OrderStatus};
use thiserror::Error;

/// Errors that can occur when interacting with the checkout store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A compare-and-swap write found the product at a different version
    /// than the one read earlier in the unit of work.
    #[error(
        "Write conflict on product {product_id}: expected version {expected}, found {actual}"
    )]
    WriteConflict {
        product_id: ProductId,
        expected: Version,
        actual: Version,
    },

    /// An order with this number already exists.
    #[error("Duplicate order number: {0}")]
    DuplicateOrderNumber(OrderNumber),

    /// A product with this ID already exists.
    #[error("Product already exists: {0}")]
    ProductExists(ProductId),

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order's status changed since it was read.
    #[error("Status conflict on order {order_id}: expected {expected}, found {actual}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// A stored row failed validation on read.
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for errors caused by a concurrent writer winning a race.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::WriteConflict { .. } | StoreError::StatusConflict { .. }
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
