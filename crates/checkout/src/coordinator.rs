//! Checkout coordinator running each operation as one unit of work.

use std::future::Future;
use std::time::Instant;

use chrono::Utc;
use common::{OrderId, ProductId};
use domain::{
    AggregatedCart, NewProduct, Order, OrderNumber, OrderStatus, PlaceOrder, Product,
    ProductDetails, SizeCode, aggregate_lines, plan_decrements, plan_restock,
};
use order_store::{CheckoutStore, UnitOfWork, UnitOfWorkExt};

use crate::config::{CheckoutConfig, TotalsPolicy};
use crate::error::{CheckoutError, Result};

/// Places orders and maintains product stock.
///
/// Every operation reads, validates and writes inside a single unit of work
/// and either commits all of its writes or none. Attempts that lose a
/// compare-and-swap race are retried from scratch with fresh reads, up to
/// [`CheckoutConfig::max_attempts`].
///
/// [`CheckoutConfig::attempt_timeout`] bounds only the staging of an
/// attempt. The commit itself is always awaited, so a `Timeout` error means
/// nothing was written.
pub struct CheckoutCoordinator<S: CheckoutStore> {
    store: S,
    config: CheckoutConfig,
}

impl<S: CheckoutStore> CheckoutCoordinator<S> {
    /// Creates a new coordinator.
    pub fn new(store: S, config: CheckoutConfig) -> Self {
        Self { store, config }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the coordinator configuration.
    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Places an order: validates stock for every line, decrements it and
    /// writes the order, all in one unit of work.
    ///
    /// On success the returned order is committed and its items carry the
    /// product name, image and unit price as they were at this moment.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.user_id, lines = request.items.len())
    )]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order> {
        let start = Instant::now();

        let result = match aggregate_lines(&request.items) {
            Ok(cart) => {
                let (request, cart) = (&request, &cart);
                self.with_retry("place_order", move || self.place_once(request, cart))
                    .await
            }
            Err(e) => Err(e.into()),
        };

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(order) => {
                metrics::counter!("checkout_orders_placed_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    items = order.item_count(),
                    totals_verified = order.totals_verified,
                    "order placed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total", "reason" => e.reason()).increment(1);
                tracing::info!(reason = e.reason(), error = %e, "checkout rejected");
            }
        }
        result
    }

    async fn place_once(
        &self,
        request: &PlaceOrder,
        cart: &AggregatedCart,
    ) -> Result<(S::Unit, Order)> {
        let mut unit = self.store.begin().await?;

        let ids: Vec<ProductId> = cart.product_ids().cloned().collect();
        let products = unit.read_products(&ids).await?;

        // Validate the whole cart before the first write.
        let updates = plan_decrements(cart, &products)?;
        let order = Order::place(request, &products, Utc::now())?;
        self.check_totals(&order)?;

        for update in &updates {
            unit.write_stock(update).await?;
        }
        unit.insert_order(&order).await?;

        Ok((unit, order))
    }

    fn check_totals(&self, order: &Order) -> Result<()> {
        if order.totals_verified {
            return Ok(());
        }
        let mismatch = match order.verify_totals() {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        metrics::counter!("checkout_totals_mismatch_total").increment(1);
        match self.config.totals_policy {
            TotalsPolicy::Flag => {
                tracing::warn!(
                    order_number = %order.order_number,
                    error = %mismatch,
                    "submitted totals disagree; order flagged"
                );
                Ok(())
            }
            TotalsPolicy::Reject => Err(mismatch.into()),
        }
    }

    /// Creates a product at its first version.
    #[tracing::instrument(skip(self, new), fields(product_id = %new.id))]
    pub async fn create_product(&self, new: NewProduct) -> Result<Product> {
        new.details.validate()?;
        let product = Product::create(new);

        let mut unit = self.store.begin().await?;
        unit.insert_product(&product).await?;
        unit.commit().await?;

        tracing::info!(sizes = product.stock.iter().count(), "product created");
        Ok(product)
    }

    /// Adds units of one size to a product's stock.
    #[tracing::instrument(skip(self))]
    pub async fn restock(
        &self,
        product_id: &ProductId,
        size: &SizeCode,
        units: u32,
    ) -> Result<Product> {
        let product = self
            .with_retry("restock", move || async move {
                let mut unit = self.store.begin().await?;
                let mut product = unit.read_product(product_id).await?;
                let update = plan_restock(&product, size, units)?;
                product.version = unit.write_stock(&update).await?;
                product.stock = update.stock;
                Ok((unit, product))
            })
            .await?;

        tracing::info!(version = %product.version, "product restocked");
        Ok(product)
    }

    /// Replaces a product's name, image and prices.
    ///
    /// Orders already placed keep their snapshots.
    #[tracing::instrument(skip(self, details))]
    pub async fn update_product_details(
        &self,
        product_id: &ProductId,
        details: ProductDetails,
    ) -> Result<Product> {
        details.validate()?;
        let details = &details;

        self.with_retry("update_product_details", move || async move {
            let mut unit = self.store.begin().await?;
            let current = unit.read_product(product_id).await?;
            let mut updated = current.with_details(details.clone());
            updated.version = unit.update_product(&updated).await?;
            Ok((unit, updated))
        })
        .await
    }

    /// Moves an order to a new status. Stock is never touched.
    #[tracing::instrument(skip(self))]
    pub async fn transition_status(&self, order_id: OrderId, next: OrderStatus) -> Result<Order> {
        let order = self
            .with_retry("transition_status", move || async move {
                let mut unit = self.store.begin().await?;
                let mut order = unit
                    .read_order(order_id)
                    .await?
                    .ok_or(CheckoutError::OrderNotFound(order_id))?;
                let previous = order.status;
                order.status = previous.transition(next)?;
                unit.set_order_status(order_id, previous, order.status)
                    .await?;
                Ok((unit, order))
            })
            .await?;

        tracing::info!(status = %order.status, "order status changed");
        Ok(order)
    }

    /// Gets a committed order by ID.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.store.get_order(order_id).await?)
    }

    /// Gets a committed order by its order number.
    pub async fn get_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        Ok(self.store.get_order_by_number(number).await?)
    }

    /// Gets a committed product.
    pub async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.store.get_product(product_id).await?)
    }

    /// Stages an attempt with `stage` and commits the unit it returns,
    /// starting over on a write conflict until `max_attempts` is reached.
    ///
    /// Staging is bounded by `attempt_timeout`; a timed-out attempt is
    /// dropped before commit, which rolls back its unit of work.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut stage: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(S::Unit, T)>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            metrics::counter!("checkout_attempts_total", "operation" => operation).increment(1);

            let staged = match self.config.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, stage()).await {
                    Ok(staged) => staged,
                    Err(_) => {
                        tracing::warn!(operation, attempts, ?limit, "attempt timed out");
                        return Err(CheckoutError::Timeout(limit));
                    }
                },
                None => stage().await,
            };

            // Not under the timeout: once a commit starts its result must be seen.
            let outcome = match staged {
                Ok((unit, value)) => unit
                    .commit()
                    .await
                    .map(|()| value)
                    .map_err(CheckoutError::from),
                Err(e) => Err(e),
            };

            match outcome {
                Err(CheckoutError::WriteConflict { .. }) => {
                    metrics::counter!("checkout_write_conflicts_total", "operation" => operation)
                        .increment(1);
                    if attempts >= max_attempts {
                        tracing::warn!(operation, attempts, "giving up after write conflicts");
                        return Err(CheckoutError::WriteConflict { attempts });
                    }
                    tracing::debug!(operation, attempts, "write conflict, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempts).await;
                }
                other => return other,
            }
        }
    }
}
