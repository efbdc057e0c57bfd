//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{Money, ProductId, UserId, Version};
use domain::{
    CartLineItem, CustomerDetails, NewProduct, Order, OrderNumber, OrderStatus, OrderTotals,
    PaymentMethod, PlaceOrder, Product, ProductDetails, ProductSet, ShippingAddress, SizeCode,
    StockMap, StockUpdate,
};
use order_store::{CheckoutStore, PostgresCheckoutStore, StoreError, UnitOfWork, UnitOfWorkExt};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // raw_sql runs the whole file, function definition included
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_checkout_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresCheckoutStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_items, orders, products")
        .execute(&pool)
        .await
        .unwrap();

    PostgresCheckoutStore::new(pool)
}

fn size(code: &str) -> SizeCode {
    SizeCode::parse(code).unwrap()
}

fn product(id: &str, counts: &[(&str, i64)]) -> Product {
    Product::create(NewProduct {
        id: ProductId::new(id),
        details: ProductDetails {
            name: format!("{id} name"),
            image: format!("/img/{id}.png"),
            price: Money::from_cents(1500),
            sale_price: None,
        },
        stock: StockMap::from_counts(counts.iter().copied()).unwrap(),
    })
}

fn order(number: &str, products: &ProductSet, lines: Vec<CartLineItem>) -> Order {
    let request = PlaceOrder {
        user_id: UserId::new(),
        order_number: Some(OrderNumber::parse(number).unwrap()),
        customer: CustomerDetails {
            full_name: "Test Customer".to_string(),
            email: "customer@example.com".to_string(),
            phone: None,
            address: ShippingAddress {
                line1: "1 Main St".to_string(),
                line2: Some("Apt 2".to_string()),
                city: "Springfield".to_string(),
                region: None,
                postal_code: "12345".to_string(),
                country: "US".to_string(),
            },
        },
        payment_method: PaymentMethod::parse("card").unwrap(),
        items: lines,
        totals: OrderTotals {
            subtotal: Money::from_cents(1500),
            shipping: Money::zero(),
            tax: Money::zero(),
            total: Money::from_cents(1500),
        },
    };
    Order::place(&request, products, Utc::now()).unwrap()
}

async fn seed(store: &PostgresCheckoutStore, products: &[Product]) {
    let mut unit = store.begin().await.unwrap();
    for p in products {
        unit.insert_product(p).await.unwrap();
    }
    unit.commit().await.unwrap();
}

fn decrement(product: &Product, code: &str, units: u32) -> StockUpdate {
    let mut stock = product.stock.clone();
    stock.set(size(code), product.stock.available(&size(code)) - units);
    StockUpdate {
        product_id: product.id.clone(),
        expected_version: product.version,
        stock,
    }
}

#[tokio::test]
async fn ping_reaches_database() {
    let store = get_test_store().await;
    store.ping().await.unwrap();
    assert_eq!(store.backend(), "postgres");
}

#[tokio::test]
async fn insert_and_read_product() {
    let store = get_test_store().await;
    let p = product("A", &[("S", 2), ("M", 5)]);
    seed(&store, std::slice::from_ref(&p)).await;

    let stored = store.get_product(&p.id).await.unwrap().unwrap();
    assert_eq!(stored, p);
    assert!(store.get_product(&ProductId::new("missing")).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_product_is_rejected() {
    let store = get_test_store().await;
    seed(&store, &[product("A", &[("M", 1)])]).await;

    let mut unit = store.begin().await.unwrap();
    let result = unit.insert_product(&product("A", &[("M", 1)])).await;
    assert!(matches!(result, Err(StoreError::ProductExists(_))));
}

#[tokio::test]
async fn stock_write_bumps_version() {
    let store = get_test_store().await;
    seed(&store, &[product("A", &[("M", 5)])]).await;

    let mut unit = store.begin().await.unwrap();
    let a = unit.read_product(&ProductId::new("A")).await.unwrap();
    let version = unit.write_stock(&decrement(&a, "M", 2)).await.unwrap();
    unit.commit().await.unwrap();

    assert_eq!(version, Version::new(2));
    let stored = store.get_product(&a.id).await.unwrap().unwrap();
    assert_eq!(stored.stock.available(&size("M")), 3);
    assert_eq!(stored.version, Version::new(2));
}

#[tokio::test]
async fn stale_stock_write_conflicts() {
    let store = get_test_store().await;
    seed(&store, &[product("B", &[("M", 5)])]).await;
    let id = ProductId::new("B");

    let mut stale = store.begin().await.unwrap();
    let seen = stale.read_product(&id).await.unwrap();

    let mut winner = store.begin().await.unwrap();
    let fresh = winner.read_product(&id).await.unwrap();
    winner.write_stock(&decrement(&fresh, "M", 3)).await.unwrap();
    winner.commit().await.unwrap();

    let result = stale.write_stock(&decrement(&seen, "M", 3)).await;
    match result {
        Err(StoreError::WriteConflict {
            expected, actual, ..
        }) => {
            assert_eq!(expected, Version::first());
            assert_eq!(actual, Version::new(2));
        }
        other => panic!("expected write conflict, got {other:?}"),
    }
    drop(stale);

    let stored = store.get_product(&id).await.unwrap().unwrap();
    assert_eq!(stored.stock.available(&size("M")), 2);
}

#[tokio::test]
async fn dropped_unit_leaves_no_trace() {
    let store = get_test_store().await;
    seed(&store, &[product("A", &[("M", 5)])]).await;

    {
        let mut unit = store.begin().await.unwrap();
        let products = unit.read_products(&[ProductId::new("A")]).await.unwrap();
        let a = products.get(&ProductId::new("A")).unwrap().clone();
        unit.write_stock(&decrement(&a, "M", 1)).await.unwrap();
        unit.insert_order(&order(
            "ORD-DROPPED",
            &products,
            vec![CartLineItem::new("A", size("M"), 1)],
        ))
        .await
        .unwrap();
    }

    let stored = store.get_product(&ProductId::new("A")).await.unwrap().unwrap();
    assert_eq!(stored.stock.available(&size("M")), 5);
    let number = OrderNumber::parse("ORD-DROPPED").unwrap();
    assert!(store.get_order_by_number(&number).await.unwrap().is_none());
}

#[tokio::test]
async fn order_roundtrip_keeps_items_in_order() {
    let store = get_test_store().await;
    seed(&store, &[product("A", &[("M", 5)]), product("B", &[("L", 5)])]).await;

    let mut unit = store.begin().await.unwrap();
    let products = unit
        .read_products(&[ProductId::new("A"), ProductId::new("B")])
        .await
        .unwrap();
    let placed = order(
        "ORD-ROUNDTRIP",
        &products,
        vec![
            CartLineItem::new("B", size("L"), 2),
            CartLineItem::new("A", size("M"), 1),
            CartLineItem::new("B", size("L"), 1),
        ],
    );
    unit.insert_order(&placed).await.unwrap();
    unit.commit().await.unwrap();

    let stored = store.get_order(placed.id).await.unwrap().unwrap();
    assert_eq!(stored.items, placed.items);
    assert_eq!(stored.order_number, placed.order_number);
    assert_eq!(stored.customer, placed.customer);
    assert_eq!(stored.totals, placed.totals);
    assert_eq!(stored.status, OrderStatus::Paid);

    let by_number = store
        .get_order_by_number(&placed.order_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_number.id, placed.id);
}

#[tokio::test]
async fn duplicate_order_number_is_rejected() {
    let store = get_test_store().await;
    seed(&store, &[product("A", &[("M", 5)])]).await;
    let lines = || vec![CartLineItem::new("A", size("M"), 1)];

    let mut unit = store.begin().await.unwrap();
    let products = unit.read_products(&[ProductId::new("A")]).await.unwrap();
    unit.insert_order(&order("ORD-DUP", &products, lines()))
        .await
        .unwrap();
    unit.commit().await.unwrap();

    let mut unit = store.begin().await.unwrap();
    let result = unit
        .insert_order(&order("ORD-DUP", &products, lines()))
        .await;
    assert!(matches!(result, Err(StoreError::DuplicateOrderNumber(_))));
}

#[tokio::test]
async fn status_transition_is_conditional() {
    let store = get_test_store().await;
    seed(&store, &[product("A", &[("M", 5)])]).await;

    let mut unit = store.begin().await.unwrap();
    let products = unit.read_products(&[ProductId::new("A")]).await.unwrap();
    let placed = order(
        "ORD-STATUS",
        &products,
        vec![CartLineItem::new("A", size("M"), 1)],
    );
    unit.insert_order(&placed).await.unwrap();
    unit.commit().await.unwrap();

    let mut unit = store.begin().await.unwrap();
    unit.set_order_status(placed.id, OrderStatus::Paid, OrderStatus::Shipped)
        .await
        .unwrap();
    unit.commit().await.unwrap();

    let mut unit = store.begin().await.unwrap();
    let result = unit
        .set_order_status(placed.id, OrderStatus::Paid, OrderStatus::Refunded)
        .await;
    match result {
        Err(StoreError::StatusConflict { actual, .. }) => {
            assert_eq!(actual, OrderStatus::Shipped)
        }
        other => panic!("expected status conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_decrements_never_oversell() {
    let store = get_test_store().await;
    seed(&store, &[product("B", &[("M", 5)])]).await;
    let id = ProductId::new("B");

    let tasks = (0..8).map(|_| {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let mut unit = store.begin().await?;
            let current = unit.read_product(&id).await?;
            if current.stock.available(&size("M")) < 3 {
                return Ok(false);
            }
            unit.write_stock(&decrement(&current, "M", 3)).await?;
            unit.commit().await?;
            Ok::<bool, StoreError>(true)
        })
    });

    let results = futures_util::future::join_all(tasks).await;
    let succeeded = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|result| matches!(result, Ok(true)))
        .count();

    assert_eq!(succeeded, 1);
    let stored = store.get_product(&id).await.unwrap().unwrap();
    assert_eq!(stored.stock.available(&size("M")), 2);
}
