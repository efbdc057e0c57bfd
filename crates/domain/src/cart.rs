//! Cart line aggregation.

use std::collections::BTreeMap;

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::stock::SizeCode;

/// One `(product, size, quantity)` request from a customer's cart.
///
/// Supplied by the client and therefore untrusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub product_id: ProductId,
    pub size: SizeCode,
    pub quantity: u32,
}

impl CartLineItem {
    /// Creates a line item.
    pub fn new(product_id: impl Into<ProductId>, size: SizeCode, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            size,
            quantity,
        }
    }
}

/// Requested quantities per product and size, with duplicate
/// `(product, size)` lines merged.
///
/// Products and sizes iterate in key order, which gives every checkout the
/// same write order regardless of how the cart was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AggregatedCart {
    lines: BTreeMap<ProductId, BTreeMap<SizeCode, u32>>,
}

impl AggregatedCart {
    /// Distinct products referenced by the cart.
    pub fn product_ids(&self) -> impl Iterator<Item = &ProductId> {
        self.lines.keys()
    }

    /// Iterates products with their per-size requests.
    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, &BTreeMap<SizeCode, u32>)> {
        self.lines.iter()
    }

    /// Requested quantity for one product and size.
    pub fn requested(&self, product_id: &ProductId, size: &SizeCode) -> u32 {
        self.lines
            .get(product_id)
            .and_then(|sizes| sizes.get(size))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct products.
    pub fn product_count(&self) -> usize {
        self.lines.len()
    }
}

/// Consolidates raw cart lines into per-product size requests.
///
/// Performs no I/O. Fails on an empty cart, a zero quantity, or a merged
/// quantity that does not fit in a `u32`.
pub fn aggregate_lines(lines: &[CartLineItem]) -> Result<AggregatedCart, DomainError> {
    if lines.is_empty() {
        return Err(DomainError::EmptyCart);
    }

    let mut cart = AggregatedCart::default();
    for line in lines {
        if line.quantity == 0 {
            return Err(DomainError::InvalidQuantity {
                product_id: line.product_id.clone(),
                size: line.size.clone(),
                quantity: 0,
            });
        }

        let entry = cart
            .lines
            .entry(line.product_id.clone())
            .or_default()
            .entry(line.size.clone())
            .or_insert(0);

        let current = *entry;
        *entry = current
            .checked_add(line.quantity)
            .ok_or_else(|| DomainError::InvalidQuantity {
                product_id: line.product_id.clone(),
                size: line.size.clone(),
                quantity: u64::from(current) + u64::from(line.quantity),
            })?;
    }

    Ok(cart)
}
