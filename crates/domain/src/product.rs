//! Products as seen by checkout.

use std::collections::HashMap;

use common::{Money, ProductId, Version};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::stock::StockMap;

/// A catalog product with its live stock map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub image: String,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub stock: StockMap,
    /// Bumped on every write; stock writes are conditioned on it.
    pub version: Version,
}

impl Product {
    /// Creates a product at its first version.
    pub fn create(new: NewProduct) -> Self {
        Self {
            id: new.id,
            name: new.details.name,
            image: new.details.image,
            price: new.details.price,
            sale_price: new.details.sale_price,
            stock: new.stock,
            version: Version::first(),
        }
    }

    /// The price a customer pays right now: sale price if set, else base price.
    pub fn unit_price(&self) -> Money {
        self.sale_price.unwrap_or(self.price)
    }

    /// Copies the display fields for embedding in an order item.
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
        }
    }

    /// Returns a copy with the given display and price fields applied.
    pub fn with_details(&self, details: ProductDetails) -> Self {
        Self {
            name: details.name,
            image: details.image,
            price: details.price,
            sale_price: details.sale_price,
            ..self.clone()
        }
    }
}

/// Editable display and price fields of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub image: String,
    pub price: Money,
    #[serde(default)]
    pub sale_price: Option<Money>,
}

impl ProductDetails {
    /// Rejects negative base or sale prices.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.price.is_negative() {
            return Err(DomainError::InvalidPrice(self.price));
        }
        match self.sale_price {
            Some(sale) if sale.is_negative() => Err(DomainError::InvalidPrice(sale)),
            _ => Ok(()),
        }
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub id: ProductId,
    #[serde(flatten)]
    pub details: ProductDetails,
    #[serde(default)]
    pub stock: StockMap,
}

/// Frozen copy of a product's display data stored on an order item.
///
/// Later edits to the live product never reach this copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub image: String,
}

/// Products read inside one unit of work, keyed by ID.
#[derive(Debug, Clone, Default)]
pub struct ProductSet(HashMap<ProductId, Product>);

impl ProductSet {
    /// Returns the product or a `ProductNotFound` error.
    pub fn require(&self, id: &ProductId) -> Result<&Product, DomainError> {
        self.0
            .get(id)
            .ok_or_else(|| DomainError::ProductNotFound(id.clone()))
    }

    /// Returns the product if it was read.
    pub fn get(&self, id: &ProductId) -> Option<&Product> {
        self.0.get(id)
    }
}

impl FromIterator<Product> for ProductSet {
    fn from_iter<T: IntoIterator<Item = Product>>(iter: T) -> Self {
        Self(iter.into_iter().map(|p| (p.id.clone(), p)).collect())
    }
}
