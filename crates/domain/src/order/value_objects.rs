//! Value objects carried on an order.

use chrono::{DateTime, Utc};
use common::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

const MAX_ORDER_NUMBER_LEN: usize = 64;

/// Human-facing order number, supplied by the caller or generated.
///
/// Order numbers are unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Parses a caller-supplied order number.
    pub fn parse(number: impl Into<String>) -> Result<Self, DomainError> {
        let number = number.into();
        let valid = !number.is_empty()
            && number.len() <= MAX_ORDER_NUMBER_LEN
            && number.chars().all(|c| c.is_ascii_graphic());
        if valid {
            Ok(Self(number))
        } else {
            Err(DomainError::InvalidOrderNumber(number))
        }
    }

    /// Generates a number of the form `ORD-YYYYMMDD-XXXXXXXX`.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "ORD-{}-{}",
            at.format("%Y%m%d"),
            suffix[..8].to_ascii_uppercase()
        ))
    }

    /// Returns the order number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment method label chosen at checkout. Payment itself is mocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentMethod(String);

impl PaymentMethod {
    /// Parses a non-empty payment method label.
    pub fn parse(method: impl Into<String>) -> Result<Self, DomainError> {
        let method = method.into();
        if method.trim().is_empty() {
            Err(DomainError::PaymentMethodRequired)
        } else {
            Ok(Self(method))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PaymentMethod> for String {
    fn from(method: PaymentMethod) -> Self {
        method.0
    }
}

/// Delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Customer contact and delivery details as entered at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub address: ShippingAddress,
}

/// Monetary totals of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

impl OrderTotals {
    /// Checks the totals against a subtotal recomputed from unit prices.
    ///
    /// The submitted subtotal must equal `computed_subtotal`, no figure may
    /// be negative, and `total` must equal `subtotal + shipping + tax`. A sum
    /// that does not fit in `Money` fails with `AmountOverflow`.
    pub fn check(&self, computed_subtotal: Money) -> Result<(), DomainError> {
        if self.subtotal != computed_subtotal {
            return Err(DomainError::TotalsMismatch {
                field: "subtotal",
                submitted: self.subtotal,
                computed: computed_subtotal,
            });
        }
        for (field, amount) in [("shipping", self.shipping), ("tax", self.tax)] {
            if amount.is_negative() {
                return Err(DomainError::TotalsMismatch {
                    field,
                    submitted: amount,
                    computed: Money::zero(),
                });
            }
        }
        let expected_total = Money::checked_sum([self.subtotal, self.shipping, self.tax])
            .ok_or(DomainError::AmountOverflow { field: "total" })?;
        if self.total != expected_total {
            return Err(DomainError::TotalsMismatch {
                field: "total",
                submitted: self.total,
                computed: expected_total,
            });
        }
        Ok(())
    }
}
