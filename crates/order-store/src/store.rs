use async_trait::async_trait;
use common::{OrderId, ProductId, Version};
use domain::{Order, OrderNumber, OrderStatus, Product, ProductSet, StockUpdate};

use crate::{Result, StoreError};

/// Core trait for checkout store implementations.
///
/// A store hands out units of work and serves committed state for
/// read-back. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// The unit-of-work type handed out by [`CheckoutStore::begin`].
    type Unit: UnitOfWork;

    /// Short backend label used in logs, metrics and the health report.
    fn backend(&self) -> &'static str;

    /// Checks that the backing storage is reachable.
    async fn ping(&self) -> Result<()>;

    /// Starts a new unit of work.
    async fn begin(&self) -> Result<Self::Unit>;

    /// Reads a committed product.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Reads a committed order with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Reads a committed order by its order number.
    async fn get_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>>;
}

/// An all-or-nothing group of reads and writes.
///
/// Every product write is a compare-and-swap on the product's `version`:
/// it fails with [`StoreError::WriteConflict`] when another unit committed
/// a write to the same product after this unit read it. Dropping a unit
/// without calling [`UnitOfWork::commit`] rolls it back.
#[async_trait]
pub trait UnitOfWork: Send + Sized {
    /// Reads the current state of the given products.
    ///
    /// Missing IDs are simply absent from the returned set.
    async fn read_products(&mut self, ids: &[ProductId]) -> Result<ProductSet>;

    /// Inserts a new product.
    async fn insert_product(&mut self, product: &Product) -> Result<()>;

    /// Replaces a product's stock map if it is still at
    /// `update.expected_version`. Returns the new version.
    async fn write_stock(&mut self, update: &StockUpdate) -> Result<Version>;

    /// Replaces a product's details and stock if it is still at
    /// `product.version`. Returns the new version.
    async fn update_product(&mut self, product: &Product) -> Result<Version>;

    /// Inserts an order and its items.
    ///
    /// Fails with [`StoreError::DuplicateOrderNumber`] if the number is taken.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Reads an order with its items.
    async fn read_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Moves an order from `expected` to `next` status.
    async fn set_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()>;

    /// Makes every write of this unit visible at once.
    async fn commit(self) -> Result<()>;
}

/// Extension trait providing convenience methods for units of work.
#[async_trait]
pub trait UnitOfWorkExt: UnitOfWork {
    /// Reads a single product, failing if it does not exist.
    async fn read_product(&mut self, id: &ProductId) -> Result<Product> {
        let products = self.read_products(std::slice::from_ref(id)).await?;
        products
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ProductNotFound(id.clone()))
    }
}

// Blanket implementation for all UnitOfWork implementations
impl<T: UnitOfWork> UnitOfWorkExt for T {}
