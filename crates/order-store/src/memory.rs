use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId, Version};
use domain::{Order, OrderNumber, OrderStatus, Product, ProductSet, StockUpdate};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{CheckoutStore, UnitOfWork},
};

#[derive(Debug, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    order_numbers: HashMap<OrderNumber, OrderId>,
}

/// In-memory checkout store for testing and single-process deployments.
///
/// Units of work stage their writes privately; `commit` takes the write
/// lock, re-checks every version the unit based its writes on, and applies
/// everything in one critical section.
#[derive(Clone, Default)]
pub struct InMemoryCheckoutStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryCheckoutStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of committed products.
    pub async fn product_count(&self) -> usize {
        self.state.read().await.products.len()
    }
}

#[async_trait]
impl CheckoutStore for InMemoryCheckoutStore {
    type Unit = InMemoryUnit;

    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn begin(&self) -> Result<Self::Unit> {
        Ok(InMemoryUnit {
            state: Arc::clone(&self.state),
            products: BTreeMap::new(),
            orders: Vec::new(),
            status_changes: Vec::new(),
        })
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(id).cloned())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn get_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .order_numbers
            .get(number)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }
}

/// A staged product write and the committed version it was based on.
///
/// `base` is `None` for inserts.
#[derive(Debug)]
struct StagedProduct {
    base: Option<Version>,
    product: Product,
}

#[derive(Debug)]
struct StatusChange {
    order_id: OrderId,
    expected: OrderStatus,
    next: OrderStatus,
}

/// Unit of work over an [`InMemoryCheckoutStore`].
pub struct InMemoryUnit {
    state: Arc<RwLock<MemoryState>>,
    products: BTreeMap<ProductId, StagedProduct>,
    orders: Vec<Order>,
    status_changes: Vec<StatusChange>,
}

impl InMemoryUnit {
    /// Current view of a product: staged if this unit wrote it, else committed.
    async fn current_product(&self, id: &ProductId) -> Option<Product> {
        if let Some(staged) = self.products.get(id) {
            return Some(staged.product.clone());
        }
        self.state.read().await.products.get(id).cloned()
    }

    fn stage_write(&mut self, current: &Product, updated: Product) -> Version {
        let version = updated.version;
        let base = self
            .products
            .get(&current.id)
            .map_or(Some(current.version), |staged| staged.base);
        self.products.insert(
            current.id.clone(),
            StagedProduct {
                base,
                product: updated,
            },
        );
        version
    }

    async fn compare_and_stage(
        &mut self,
        id: &ProductId,
        expected: Version,
        apply: impl FnOnce(&Product) -> Product + Send,
    ) -> Result<Version> {
        let current = self
            .current_product(id)
            .await
            .ok_or_else(|| StoreError::ProductNotFound(id.clone()))?;

        if current.version != expected {
            metrics::counter!("store_write_conflicts_total", "backend" => "memory").increment(1);
            return Err(StoreError::WriteConflict {
                product_id: id.clone(),
                expected,
                actual: current.version,
            });
        }

        let mut updated = apply(&current);
        updated.version = expected.next();
        Ok(self.stage_write(&current, updated))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnit {
    async fn read_products(&mut self, ids: &[ProductId]) -> Result<ProductSet> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(product) = self.current_product(id).await {
                found.push(product);
            }
        }
        Ok(found.into_iter().collect())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        if self.current_product(&product.id).await.is_some() {
            return Err(StoreError::ProductExists(product.id.clone()));
        }
        self.products.insert(
            product.id.clone(),
            StagedProduct {
                base: None,
                product: product.clone(),
            },
        );
        Ok(())
    }

    async fn write_stock(&mut self, update: &StockUpdate) -> Result<Version> {
        let stock = update.stock.clone();
        self.compare_and_stage(&update.product_id, update.expected_version, move |current| {
            Product {
                stock,
                ..current.clone()
            }
        })
        .await
    }

    async fn update_product(&mut self, product: &Product) -> Result<Version> {
        let replacement = product.clone();
        self.compare_and_stage(&product.id, product.version, move |_| replacement)
            .await
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let taken = self
            .orders
            .iter()
            .any(|staged| staged.order_number == order.order_number)
            || self
                .state
                .read()
                .await
                .order_numbers
                .contains_key(&order.order_number);
        if taken {
            return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
        }
        self.orders.push(order.clone());
        Ok(())
    }

    async fn read_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let mut order = match self.orders.iter().find(|o| o.id == id) {
            Some(staged) => Some(staged.clone()),
            None => self.state.read().await.orders.get(&id).cloned(),
        };
        if let Some(order) = order.as_mut() {
            for change in self.status_changes.iter().filter(|c| c.order_id == id) {
                order.status = change.next;
            }
        }
        Ok(order)
    }

    async fn set_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()> {
        let current = self
            .read_order(id)
            .await?
            .ok_or(StoreError::OrderNotFound(id))?;
        if current.status != expected {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual: current.status,
            });
        }
        self.status_changes.push(StatusChange {
            order_id: id,
            expected,
            next,
        });
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let mut state = self.state.write().await;

        // Validate everything before applying anything.
        for (id, staged) in &self.products {
            let committed = state.products.get(id).map(|p| p.version);
            match (staged.base, committed) {
                (None, Some(_)) => return Err(StoreError::ProductExists(id.clone())),
                (Some(base), Some(actual)) if base != actual => {
                    metrics::counter!("store_write_conflicts_total", "backend" => "memory")
                        .increment(1);
                    return Err(StoreError::WriteConflict {
                        product_id: id.clone(),
                        expected: base,
                        actual,
                    });
                }
                (Some(_), None) => return Err(StoreError::ProductNotFound(id.clone())),
                _ => {}
            }
        }
        for order in &self.orders {
            if state.order_numbers.contains_key(&order.order_number) {
                return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
            }
        }
        let mut statuses: HashMap<OrderId, OrderStatus> = HashMap::new();
        for change in &self.status_changes {
            let actual = match statuses.get(&change.order_id) {
                Some(status) => *status,
                None => match state.orders.get(&change.order_id) {
                    Some(order) => order.status,
                    None => self
                        .orders
                        .iter()
                        .find(|o| o.id == change.order_id)
                        .map(|o| o.status)
                        .ok_or(StoreError::OrderNotFound(change.order_id))?,
                },
            };
            if actual != change.expected {
                return Err(StoreError::StatusConflict {
                    order_id: change.order_id,
                    expected: change.expected,
                    actual,
                });
            }
            statuses.insert(change.order_id, change.next);
        }

        for (id, staged) in self.products {
            state.products.insert(id, staged.product);
        }
        for mut order in self.orders {
            if let Some(status) = statuses.remove(&order.id) {
                order.status = status;
            }
            state.order_numbers.insert(order.order_number.clone(), order.id);
            state.orders.insert(order.id, order);
        }
        for (order_id, status) in statuses {
            if let Some(order) = state.orders.get_mut(&order_id) {
                order.status = status;
            }
        }

        metrics::counter!("store_commits_total", "backend" => "memory").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{Money, UserId};
    use domain::{
        CartLineItem, CustomerDetails, NewProduct, OrderTotals, PaymentMethod, PlaceOrder,
        ProductDetails, ShippingAddress, SizeCode, StockMap,
    };

    use super::*;
    use crate::store::UnitOfWorkExt;

    fn size(code: &str) -> SizeCode {
        SizeCode::parse(code).unwrap()
    }

    fn product(id: &str, counts: &[(&str, i64)]) -> Product {
        Product::create(NewProduct {
            id: ProductId::new(id),
            details: ProductDetails {
                name: id.to_string(),
                image: format!("/img/{id}.png"),
                price: Money::from_cents(1000),
                sale_price: None,
            },
            stock: StockMap::from_counts(counts.iter().copied()).unwrap(),
        })
    }

    fn order(number: &str, products: &ProductSet, product_id: &str) -> Order {
        let request = PlaceOrder {
            user_id: UserId::new(),
            order_number: Some(OrderNumber::parse(number).unwrap()),
            customer: CustomerDetails {
                full_name: "Test".to_string(),
                email: "test@example.com".to_string(),
                phone: None,
                address: ShippingAddress {
                    line1: "1 Test St".to_string(),
                    line2: None,
                    city: "Test".to_string(),
                    region: None,
                    postal_code: "0000".to_string(),
                    country: "US".to_string(),
                },
            },
            payment_method: PaymentMethod::parse("card").unwrap(),
            items: vec![CartLineItem::new(product_id, size("M"), 1)],
            totals: OrderTotals {
                subtotal: Money::from_cents(1000),
                shipping: Money::zero(),
                tax: Money::zero(),
                total: Money::from_cents(1000),
            },
        };
        Order::place(&request, products, Utc::now()).unwrap()
    }

    async fn seeded(products: &[Product]) -> InMemoryCheckoutStore {
        let store = InMemoryCheckoutStore::new();
        let mut unit = store.begin().await.unwrap();
        for p in products {
            unit.insert_product(p).await.unwrap();
        }
        unit.commit().await.unwrap();
        store
    }

    fn decrement(product: &Product, units: u32) -> StockUpdate {
        let mut stock = product.stock.clone();
        let m = size("M");
        stock.set(m.clone(), product.stock.available(&m) - units);
        StockUpdate {
            product_id: product.id.clone(),
            expected_version: product.version,
            stock,
        }
    }

    #[tokio::test]
    async fn insert_and_read_product() {
        let store = seeded(&[product("A", &[("M", 5)])]).await;

        let stored = store.get_product(&ProductId::new("A")).await.unwrap().unwrap();
        assert_eq!(stored.version, Version::first());
        assert_eq!(store.product_count().await, 1);
    }

    #[tokio::test]
    async fn duplicate_product_insert_fails() {
        let store = seeded(&[product("A", &[("M", 5)])]).await;
        let mut unit = store.begin().await.unwrap();
        let result = unit.insert_product(&product("A", &[])).await;
        assert!(matches!(result, Err(StoreError::ProductExists(_))));
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = seeded(&[product("A", &[("M", 5)])]).await;
        let mut unit = store.begin().await.unwrap();
        let a = unit.read_product(&ProductId::new("A")).await.unwrap();
        unit.write_stock(&decrement(&a, 2)).await.unwrap();

        // Staged view inside the unit
        let staged = unit.read_product(&ProductId::new("A")).await.unwrap();
        assert_eq!(staged.stock.available(&size("M")), 3);

        // Committed view is untouched
        let committed = store.get_product(&ProductId::new("A")).await.unwrap().unwrap();
        assert_eq!(committed.stock.available(&size("M")), 5);

        drop(unit);
        let committed = store.get_product(&ProductId::new("A")).await.unwrap().unwrap();
        assert_eq!(committed.stock.available(&size("M")), 5);
        assert_eq!(committed.version, Version::first());
    }

    #[tokio::test]
    async fn commit_applies_stock_and_bumps_version() {
        let store = seeded(&[product("A", &[("M", 5)])]).await;
        let mut unit = store.begin().await.unwrap();
        let a = unit.read_product(&ProductId::new("A")).await.unwrap();
        let version = unit.write_stock(&decrement(&a, 2)).await.unwrap();
        unit.commit().await.unwrap();

        assert_eq!(version, Version::new(2));
        let committed = store.get_product(&ProductId::new("A")).await.unwrap().unwrap();
        assert_eq!(committed.stock.available(&size("M")), 3);
        assert_eq!(committed.version, Version::new(2));
    }

    #[tokio::test]
    async fn racing_units_conflict_at_commit() {
        let store = seeded(&[product("B", &[("M", 5)])]).await;
        let id = ProductId::new("B");

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        let seen_by_first = first.read_product(&id).await.unwrap();
        let seen_by_second = second.read_product(&id).await.unwrap();

        first.write_stock(&decrement(&seen_by_first, 3)).await.unwrap();
        second.write_stock(&decrement(&seen_by_second, 3)).await.unwrap();

        first.commit().await.unwrap();
        let result = second.commit().await;
        assert!(matches!(result, Err(StoreError::WriteConflict { .. })));

        let committed = store.get_product(&id).await.unwrap().unwrap();
        assert_eq!(committed.stock.available(&size("M")), 2);
    }

    #[tokio::test]
    async fn stale_write_conflicts_immediately() {
        let store = seeded(&[product("B", &[("M", 5)])]).await;
        let id = ProductId::new("B");

        let mut stale = store.begin().await.unwrap();
        let seen = stale.read_product(&id).await.unwrap();

        let mut winner = store.begin().await.unwrap();
        let fresh = winner.read_product(&id).await.unwrap();
        winner.write_stock(&decrement(&fresh, 1)).await.unwrap();
        winner.commit().await.unwrap();

        let result = stale.write_stock(&decrement(&seen, 1)).await;
        match result {
            Err(StoreError::WriteConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, Version::first());
                assert_eq!(actual, Version::new(2));
            }
            other => panic!("expected write conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = seeded(&[product("A", &[("M", 5)]), product("B", &[("M", 5)])]).await;
        let a_id = ProductId::new("A");
        let b_id = ProductId::new("B");

        let mut unit = store.begin().await.unwrap();
        let products = unit.read_products(&[a_id.clone(), b_id.clone()]).await.unwrap();
        let a = products.get(&a_id).unwrap().clone();
        let b = products.get(&b_id).unwrap().clone();
        unit.write_stock(&decrement(&a, 1)).await.unwrap();
        unit.write_stock(&decrement(&b, 1)).await.unwrap();
        unit.insert_order(&order("ORD-1", &products, "A")).await.unwrap();

        // A concurrent writer bumps B before our commit
        let mut other = store.begin().await.unwrap();
        other.write_stock(&decrement(&b, 4)).await.unwrap();
        other.commit().await.unwrap();

        assert!(unit.commit().await.is_err());

        let a_after = store.get_product(&a_id).await.unwrap().unwrap();
        assert_eq!(a_after.stock.available(&size("M")), 5);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_order_number_rejected() {
        let store = seeded(&[product("A", &[("M", 5)])]).await;

        let mut unit = store.begin().await.unwrap();
        let products = unit.read_products(&[ProductId::new("A")]).await.unwrap();
        unit.insert_order(&order("ORD-DUP", &products, "A")).await.unwrap();
        unit.commit().await.unwrap();

        let mut unit = store.begin().await.unwrap();
        let result = unit.insert_order(&order("ORD-DUP", &products, "A")).await;
        assert!(matches!(result, Err(StoreError::DuplicateOrderNumber(_))));
    }

    #[tokio::test]
    async fn duplicate_order_number_detected_at_commit() {
        let store = seeded(&[product("A", &[("M", 5)])]).await;
        let products: ProductSet = [product("A", &[("M", 5)])].into_iter().collect();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_order(&order("ORD-RACE", &products, "A")).await.unwrap();
        second.insert_order(&order("ORD-RACE", &products, "A")).await.unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(StoreError::DuplicateOrderNumber(_))
        ));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn order_readable_by_id_and_number() {
        let store = seeded(&[product("A", &[("M", 5)])]).await;
        let mut unit = store.begin().await.unwrap();
        let products = unit.read_products(&[ProductId::new("A")]).await.unwrap();
        let placed = order("ORD-READ", &products, "A");
        unit.insert_order(&placed).await.unwrap();
        unit.commit().await.unwrap();

        let by_id = store.get_order(placed.id).await.unwrap().unwrap();
        let by_number = store
            .get_order_by_number(&placed.order_number)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id, placed);
        assert_eq!(by_number, placed);
    }

    #[tokio::test]
    async fn status_change_is_compare_and_swap() {
        let store = seeded(&[product("A", &[("M", 5)])]).await;
        let mut unit = store.begin().await.unwrap();
        let products = unit.read_products(&[ProductId::new("A")]).await.unwrap();
        let placed = order("ORD-STATUS", &products, "A");
        unit.insert_order(&placed).await.unwrap();
        unit.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first
            .set_order_status(placed.id, OrderStatus::Paid, OrderStatus::Shipped)
            .await
            .unwrap();
        second
            .set_order_status(placed.id, OrderStatus::Paid, OrderStatus::Refunded)
            .await
            .unwrap();
        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(StoreError::StatusConflict { .. })
        ));

        let stored = store.get_order(placed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn missing_order_status_change_fails() {
        let store = InMemoryCheckoutStore::new();
        let mut unit = store.begin().await.unwrap();
        let result = unit
            .set_order_status(OrderId::new(), OrderStatus::Paid, OrderStatus::Shipped)
            .await;
        assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
    }
}
