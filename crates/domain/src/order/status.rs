//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Paid ──► Shipped
///    │          │         │
///    │          └─────────┴──► Refunded
///    └──► Cancelled
/// ```
///
/// Checkout creates orders directly in `Paid`. Every other transition is
/// driven by the admin workflow and none of them touch stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Awaiting payment.
    Pending,

    /// Payment captured; initial status for checkout-created orders.
    Paid,

    /// Handed to the carrier.
    Shipped,

    /// Abandoned before payment (terminal state).
    Cancelled,

    /// Money returned to the customer (terminal state).
    Refunded,
}

impl OrderStatus {
    /// Returns true if the order may move from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Paid, OrderStatus::Shipped)
                | (OrderStatus::Paid, OrderStatus::Refunded)
                | (OrderStatus::Shipped, OrderStatus::Refunded)
        )
    }

    /// Validates a transition, returning the new status.
    pub fn transition(self, next: OrderStatus) -> Result<OrderStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidStatusTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "shipped" => Ok(OrderStatus::Shipped),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}
