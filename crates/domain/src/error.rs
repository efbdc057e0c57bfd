//! Domain error types.

use common::{Money, ProductId};
use thiserror::Error;

use crate::order::OrderStatus;
use crate::stock::SizeCode;

/// Errors raised by the pure checkout rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The cart contained no line items.
    #[error("Cart has no line items")]
    EmptyCart,

    /// A line item asked for zero units, or the merged quantity overflowed.
    #[error("Invalid quantity {quantity} for product {product_id} size {size}")]
    InvalidQuantity {
        product_id: ProductId,
        size: SizeCode,
        quantity: u64,
    },

    /// A size code was empty or malformed.
    #[error("Invalid size code: {0:?}")]
    InvalidSize(String),

    /// A cart line references a product that does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Requested quantity exceeds available stock for a size.
    #[error(
        "Insufficient stock for product {product_id} size {size}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        size: SizeCode,
        available: u32,
        requested: u32,
    },

    /// A stock count was negative or out of range.
    #[error("Invalid stock count {count} for size {size}")]
    InvalidStockCount { size: String, count: i64 },

    /// Adding units to a size would overflow its counter.
    #[error("Stock overflow for product {product_id} size {size}")]
    StockOverflow { product_id: ProductId, size: SizeCode },

    /// The order status cannot move to the requested state.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Submitted monetary totals disagree with the recomputed ones.
    #[error("Totals mismatch on {field}: submitted {submitted}, computed {computed}")]
    TotalsMismatch {
        field: &'static str,
        submitted: Money,
        computed: Money,
    },

    /// Monetary arithmetic on an order overflowed.
    #[error("Amount overflow computing {field}")]
    AmountOverflow { field: &'static str },

    /// An order number was empty or malformed.
    #[error("Invalid order number: {0:?}")]
    InvalidOrderNumber(String),

    /// A product price was negative.
    #[error("Invalid price: {0}")]
    InvalidPrice(Money),

    /// A payment method label was empty.
    #[error("Payment method is required")]
    PaymentMethodRequired,
}
