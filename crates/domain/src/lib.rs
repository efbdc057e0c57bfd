//! Domain layer for the checkout system.
//!
//! This crate holds the pure, I/O-free part of order placement:
//! - `StockMap`, the per-size stock counts of a product
//! - cart aggregation of raw line items into per-product requests
//! - stock validation and decrement planning
//! - the immutable `Order` with its frozen `OrderItem` snapshots
//! - the order status state machine

pub mod cart;
pub mod checkout;
pub mod error;
pub mod order;
pub mod product;
pub mod stock;

pub use cart::{AggregatedCart, CartLineItem, aggregate_lines};
pub use checkout::{StockUpdate, plan_decrements, plan_restock, validate_stock};
pub use common::{Money, OrderId, ProductId, UserId, Version};
pub use error::DomainError;
pub use order::{
    CustomerDetails, Order, OrderItem, OrderNumber, OrderStatus, OrderTotals, PaymentMethod,
    PlaceOrder, ShippingAddress,
};
pub use product::{NewProduct, Product, ProductDetails, ProductSet, ProductSnapshot};
pub use stock::{SizeCode, StockMap};
