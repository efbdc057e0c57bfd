use async_trait::async_trait;
use common::{Money, OrderId, ProductId, UserId, Version};
use domain::{
    CustomerDetails, Order, OrderItem, OrderNumber, OrderStatus, OrderTotals, PaymentMethod,
    Product, ProductSet, ProductSnapshot, SizeCode, StockMap, StockUpdate,
};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{CheckoutStore, UnitOfWork},
};

const PRODUCT_COLUMNS: &str =
    "id, name, image, price_cents, sale_price_cents, stock, version";

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, order_date, customer, \
     payment_method, subtotal_cents, shipping_cents, tax_cents, total_cents, totals_verified";

/// PostgreSQL-backed checkout store implementation.
///
/// Each unit of work is a database transaction. Stock writes are
/// conditional updates on `version`, so two transactions that read the
/// same product cannot both decrement it.
#[derive(Clone)]
pub struct PostgresCheckoutStore {
    pool: PgPool,
}

impl PostgresCheckoutStore {
    /// Creates a new PostgreSQL checkout store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckoutStore for PostgresCheckoutStore {
    type Unit = PostgresUnit;

    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Self::Unit> {
        let tx = self.pool.begin().await?;
        Ok(PostgresUnit { tx })
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        let mut found = fetch_products(&mut conn, std::slice::from_ref(id)).await?;
        Ok(found.pop())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, id).await
    }

    async fn get_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM orders WHERE order_number = $1")
                .bind(number.as_str())
                .fetch_optional(&mut *conn)
                .await?;

        match id {
            Some(id) => fetch_order(&mut conn, OrderId::from_uuid(id)).await,
            None => Ok(None),
        }
    }
}

/// Unit of work over a PostgreSQL transaction.
///
/// Dropping the unit without committing rolls the transaction back.
pub struct PostgresUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnit {
    async fn read_products(&mut self, ids: &[ProductId]) -> Result<ProductSet> {
        let products = fetch_products(&mut self.tx, ids).await?;
        Ok(products.into_iter().collect())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, image, price_cents, sale_price_cents, stock, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(&product.image)
        .bind(product.price.cents())
        .bind(product.sale_price.map(|p| p.cents()))
        .bind(serde_json::to_value(&product.stock)?)
        .bind(product.version.as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("products_pkey")
            {
                return StoreError::ProductExists(product.id.clone());
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    #[tracing::instrument(skip(self, update), fields(product_id = %update.product_id))]
    async fn write_stock(&mut self, update: &StockUpdate) -> Result<Version> {
        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = $1, version = version + 1, updated_at = NOW()
            WHERE id = $2 AND version = $3
            RETURNING version
            "#,
        )
        .bind(serde_json::to_value(&update.stock)?)
        .bind(update.product_id.as_str())
        .bind(update.expected_version.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        match new_version {
            Some(version) => Ok(Version::new(version)),
            None => Err(self
                .lost_race(&update.product_id, update.expected_version)
                .await),
        }
    }

    async fn update_product(&mut self, product: &Product) -> Result<Version> {
        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET name = $1, image = $2, price_cents = $3, sale_price_cents = $4,
                stock = $5, version = version + 1, updated_at = NOW()
            WHERE id = $6 AND version = $7
            RETURNING version
            "#,
        )
        .bind(&product.name)
        .bind(&product.image)
        .bind(product.price.cents())
        .bind(product.sale_price.map(|p| p.cents()))
        .bind(serde_json::to_value(&product.stock)?)
        .bind(product.id.as_str())
        .bind(product.version.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        match new_version {
            Some(version) => Ok(Version::new(version)),
            None => Err(self.lost_race(&product.id, product.version).await),
        }
    }

    #[tracing::instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, user_id, status, order_date, customer,
                                payment_method, subtotal_cents, shipping_cents, tax_cents,
                                total_cents, totals_verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.order_date)
        .bind(serde_json::to_value(&order.customer)?)
        .bind(order.payment_method.as_str())
        .bind(order.totals.subtotal.cents())
        .bind(order.totals.shipping.cents())
        .bind(order.totals.tax.cents())
        .bind(order.totals.total.cents())
        .bind(order.totals_verified)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_order_number")
            {
                return StoreError::DuplicateOrderNumber(order.order_number.clone());
            }
            StoreError::Database(e)
        })?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, product_id, product_snapshot,
                                         quantity, size, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line_number(line_no)?)
            .bind(item.product.id.as_str())
            .bind(serde_json::to_value(&item.product)?)
            .bind(i64::from(item.quantity))
            .bind(item.size.as_str())
            .bind(item.unit_price.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn read_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        fetch_order(&mut self.tx, id).await
    }

    async fn set_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
        )
        .bind(next.as_str())
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let actual: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match actual {
            Some(actual) => Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual: parse_status(&actual)?,
            }),
            None => Err(StoreError::OrderNotFound(id)),
        }
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        metrics::counter!("store_commits_total", "backend" => "postgres").increment(1);
        Ok(())
    }
}

impl PostgresUnit {
    /// Explains why a conditional product update matched no row.
    async fn lost_race(&mut self, id: &ProductId, expected: Version) -> StoreError {
        let actual: std::result::Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT version FROM products WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&mut *self.tx)
                .await;

        match actual {
            Ok(Some(actual)) => {
                metrics::counter!("store_write_conflicts_total", "backend" => "postgres")
                    .increment(1);
                tracing::debug!(
                    product_id = %id,
                    expected = %expected,
                    actual,
                    "conditional stock write lost race"
                );
                StoreError::WriteConflict {
                    product_id: id.clone(),
                    expected,
                    actual: Version::new(actual),
                }
            }
            Ok(None) => StoreError::ProductNotFound(id.clone()),
            Err(e) => StoreError::Database(e),
        }
    }
}

async fn fetch_products(conn: &mut PgConnection, ids: &[ProductId]) -> Result<Vec<Product>> {
    let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
    let rows = sqlx::query(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id"
    ))
    .bind(keys)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_product).collect()
}

async fn fetch_order(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>> {
    let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let item_rows = sqlx::query(
        r#"
        SELECT product_snapshot, quantity, size, unit_price_cents
        FROM order_items
        WHERE order_id = $1
        ORDER BY line_no ASC
        "#,
    )
    .bind(id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;

    let items = item_rows
        .iter()
        .map(row_to_item)
        .collect::<Result<Vec<_>>>()?;

    row_to_order(&row, items).map(Some)
}

/// Converts an item's position to the `line_no` column type.
fn line_number(index: usize) -> Result<i32> {
    i32::try_from(index)
        .map_err(|_| StoreError::InvalidRecord(format!("order line {index} exceeds INTEGER")))
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    let stock: serde_json::Value = row.try_get("stock")?;
    Ok(Product {
        id: ProductId::new(row.try_get::<String, _>("id")?),
        name: row.try_get("name")?,
        image: row.try_get("image")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        sale_price: row
            .try_get::<Option<i64>, _>("sale_price_cents")?
            .map(Money::from_cents),
        stock: StockMap::from_json(stock)?,
        version: Version::new(row.try_get("version")?),
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    let snapshot: serde_json::Value = row.try_get("product_snapshot")?;
    let quantity: i64 = row.try_get("quantity")?;
    let size: String = row.try_get("size")?;

    Ok(OrderItem {
        product: serde_json::from_value::<ProductSnapshot>(snapshot)?,
        quantity: u32::try_from(quantity)
            .map_err(|_| StoreError::InvalidRecord(format!("item quantity {quantity}")))?,
        size: SizeCode::parse(size).map_err(|e| StoreError::InvalidRecord(e.to_string()))?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let customer: serde_json::Value = row.try_get("customer")?;
    let status: String = row.try_get("status")?;
    let order_number: String = row.try_get("order_number")?;
    let payment_method: String = row.try_get("payment_method")?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_number: OrderNumber::parse(order_number)
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?,
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        status: parse_status(&status)?,
        order_date: row.try_get("order_date")?,
        customer: serde_json::from_value::<CustomerDetails>(customer)?,
        payment_method: PaymentMethod::parse(payment_method)
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?,
        totals: OrderTotals {
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            shipping: Money::from_cents(row.try_get("shipping_cents")?),
            tax: Money::from_cents(row.try_get("tax_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
        },
        totals_verified: row.try_get("totals_verified")?,
        items,
    })
}

fn parse_status(status: &str) -> Result<OrderStatus> {
    status.parse().map_err(StoreError::InvalidRecord)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_number_rejects_positions_beyond_integer() {
        assert_eq!(line_number(0).unwrap(), 0);
        assert_eq!(line_number(i32::MAX as usize).unwrap(), i32::MAX);
        assert!(matches!(
            line_number(i32::MAX as usize + 1),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn unknown_status_is_invalid_record() {
        assert_eq!(parse_status("paid").unwrap(), OrderStatus::Paid);
        assert!(matches!(parse_status("lost"), Err(StoreError::InvalidRecord(_))));
    }
}
