//! Stock validation and decrement planning.
//!
//! Both steps operate on products read inside the caller's unit of work.
//! Nothing here writes; the resulting [`StockUpdate`]s are handed to the
//! store, which applies them with a compare-and-swap on `expected_version`.

use common::{ProductId, Version};
use serde::{Deserialize, Serialize};

use crate::cart::AggregatedCart;
use crate::error::DomainError;
use crate::product::{Product, ProductSet};
use crate::stock::{SizeCode, StockMap};

/// A new stock map for one product, valid only if the stored product is
/// still at `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub product_id: ProductId,
    pub expected_version: Version,
    pub stock: StockMap,
}

/// Checks every requested size of every product against current stock.
///
/// The whole cart is checked before anything is written. Products and sizes
/// are visited in key order, so the reported failure is deterministic.
pub fn validate_stock(cart: &AggregatedCart, products: &ProductSet) -> Result<(), DomainError> {
    for (product_id, sizes) in cart.iter() {
        let product = products.require(product_id)?;
        for (size, requested) in sizes {
            let available = product.stock.available(size);
            if available < *requested {
                tracing::debug!(
                    product_id = %product_id,
                    size = %size,
                    available,
                    requested = *requested,
                    "insufficient stock"
                );
                return Err(DomainError::InsufficientStock {
                    product_id: product_id.clone(),
                    size: size.clone(),
                    available,
                    requested: *requested,
                });
            }
        }
    }
    Ok(())
}

/// Computes the decremented stock map of every product in the cart.
///
/// Validates first; on success each update subtracts exactly the requested
/// units and leaves all other sizes untouched.
pub fn plan_decrements(
    cart: &AggregatedCart,
    products: &ProductSet,
) -> Result<Vec<StockUpdate>, DomainError> {
    validate_stock(cart, products)?;

    let mut updates = Vec::with_capacity(cart.product_count());
    for (product_id, sizes) in cart.iter() {
        let product = products.require(product_id)?;
        let mut stock = product.stock.clone();
        for (size, requested) in sizes {
            let available = stock.available(size);
            let remaining =
                available
                    .checked_sub(*requested)
                    .ok_or_else(|| DomainError::InsufficientStock {
                        product_id: product_id.clone(),
                        size: size.clone(),
                        available,
                        requested: *requested,
                    })?;
            stock.set(size.clone(), remaining);
        }
        updates.push(StockUpdate {
            product_id: product_id.clone(),
            expected_version: product.version,
            stock,
        });
    }
    Ok(updates)
}

/// Computes the stock map after adding `units` of `size` to a product.
///
/// A size the product has never tracked starts from zero.
pub fn plan_restock(
    product: &Product,
    size: &SizeCode,
    units: u32,
) -> Result<StockUpdate, DomainError> {
    if units == 0 {
        return Err(DomainError::InvalidQuantity {
            product_id: product.id.clone(),
            size: size.clone(),
            quantity: 0,
        });
    }

    let mut stock = product.stock.clone();
    let restocked = stock
        .available(size)
        .checked_add(units)
        .ok_or_else(|| DomainError::StockOverflow {
            product_id: product.id.clone(),
            size: size.clone(),
        })?;
    stock.set(size.clone(), restocked);

    Ok(StockUpdate {
        product_id: product.id.clone(),
        expected_version: product.version,
        stock,
    })
}
