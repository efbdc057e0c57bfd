//! The immutable order record written at checkout.

mod status;
mod value_objects;

pub use status::OrderStatus;
pub use value_objects::{CustomerDetails, OrderNumber, OrderTotals, PaymentMethod, ShippingAddress};

use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::cart::CartLineItem;
use crate::error::DomainError;
use crate::product::{ProductSet, ProductSnapshot};
use crate::stock::SizeCode;

/// A checkout request: who is buying, what, and the totals the client showed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub user_id: UserId,
    /// Generated when absent.
    #[serde(default)]
    pub order_number: Option<OrderNumber>,
    pub customer: CustomerDetails,
    pub payment_method: PaymentMethod,
    pub items: Vec<CartLineItem>,
    pub totals: OrderTotals,
}

/// One purchased line, frozen at the moment of purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: ProductSnapshot,
    pub quantity: u32,
    pub size: SizeCode,
    /// Sale price if one was set at purchase time, else the base price.
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the total price for this line (quantity * unit_price).
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.unit_price
            .checked_multiply(self.quantity)
            .ok_or(DomainError::AmountOverflow { field: "line_total" })
    }
}

/// An order created by a successful checkout.
///
/// Checkout never mutates an order after writing it; only the admin
/// workflow moves its `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub customer: CustomerDetails,
    pub payment_method: PaymentMethod,
    /// Totals as submitted by the caller.
    pub totals: OrderTotals,
    /// False when the submitted totals disagreed with the recomputed ones.
    pub totals_verified: bool,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Builds the order for a checkout request from products read in the
    /// same unit of work.
    ///
    /// One item is created per original cart line (not per merged line), in
    /// submission order. The order starts in `Paid`.
    pub fn place(
        request: &PlaceOrder,
        products: &ProductSet,
        order_date: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let items = request
            .items
            .iter()
            .map(|line| {
                let product = products.require(&line.product_id)?;
                Ok(OrderItem {
                    product: product.snapshot(),
                    quantity: line.quantity,
                    size: line.size.clone(),
                    unit_price: product.unit_price(),
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let order_number = request
            .order_number
            .clone()
            .unwrap_or_else(|| OrderNumber::generate(order_date));

        let totals_verified = subtotal_of(&items)
            .and_then(|computed| request.totals.check(computed))
            .is_ok();

        Ok(Self {
            id: OrderId::new(),
            order_number,
            user_id: request.user_id,
            status: OrderStatus::Paid,
            order_date,
            customer: request.customer.clone(),
            payment_method: request.payment_method.clone(),
            totals: request.totals,
            totals_verified,
            items,
        })
    }

    /// Subtotal recomputed from the frozen unit prices.
    pub fn computed_subtotal(&self) -> Result<Money, DomainError> {
        subtotal_of(&self.items)
    }

    /// Re-runs the totals check, returning the first discrepancy.
    pub fn verify_totals(&self) -> Result<(), DomainError> {
        self.totals.check(self.computed_subtotal()?)
    }

    /// Number of line items.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

fn subtotal_of(items: &[OrderItem]) -> Result<Money, DomainError> {
    items.iter().try_fold(Money::zero(), |subtotal, item| {
        subtotal
            .checked_add(item.line_total()?)
            .ok_or(DomainError::AmountOverflow { field: "subtotal" })
    })
}
