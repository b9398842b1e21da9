//! Adapter tests against a live PostgreSQL. Each test returns early when
//! `DATABASE_URL` is not set.

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use opensase_orders::application::ports::{Catalog, OrderRepository, StoreError};
use opensase_orders::domain::aggregates::{NewOrder, Order, OrderCommand, OrderItem, PricingPolicy};
use opensase_orders::domain::value_objects::{Address, Money, PaymentMethod};
use opensase_orders::infrastructure::postgres::{PgCatalog, PgOrderRepository};

async fn pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new().max_connections(16).connect(&url).await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    Some(pool)
}

async fn seed_variant(pool: &PgPool, size: &str, quantity: i32) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO products (id, name, price) VALUES ($1, 'Tee', 24.99)")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO product_variants (product_id, size, quantity) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(size)
        .bind(quantity)
        .execute(pool)
        .await
        .unwrap();
    id
}

fn pending_order(product_id: Uuid) -> Order {
    let new = NewOrder {
        user_id: format!("user-{}", Uuid::new_v4().simple()),
        items: vec![OrderItem {
            product_id,
            variant_size: "M".into(),
            variant_color: None,
            unit_price: Money::cents(2499),
            quantity: 1,
            name: "Tee".into(),
            image_ref: None,
        }],
        shipping_address: Address {
            street: "12 Marina Road".into(),
            city: "Lagos".into(),
            state: "Lagos".into(),
            zip: "101001".into(),
            country: "NG".into(),
        },
        payment_method: PaymentMethod::Card,
        coupon_code: None,
        discount: Money::zero(),
    };
    Order::create(new, &PricingPolicy::default(), Utc::now()).unwrap()
}

#[tokio::test]
async fn test_stale_version_update_conflicts() {
    let Some(pool) = pool().await else { return };
    let repo = PgOrderRepository::new(pool);
    let stored = repo.insert(&pending_order(Uuid::new_v4())).await.unwrap();
    assert_eq!(stored.version(), 1);

    let cancelled = stored.execute(OrderCommand::Cancel, Utc::now()).unwrap().unwrap();
    let written = repo.update(&cancelled).await.unwrap();
    assert_eq!(written.version(), 2);

    let err = repo.update(&cancelled).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(id) if id == stored.id()));
    let reloaded = repo.find(stored.id()).await.unwrap().unwrap();
    assert_eq!(reloaded.version(), 2);
    assert_eq!(reloaded.status(), written.status());
}

#[tokio::test]
async fn test_decrement_is_conditional_and_increment_skips_unknown_variants() {
    let Some(pool) = pool().await else { return };
    let tee = seed_variant(&pool, "M", 3).await;
    let catalog = PgCatalog::new(pool);

    assert!(catalog.try_decrement(tee, "M", 2).await.unwrap());
    assert!(!catalog.try_decrement(tee, "M", 2).await.unwrap());
    assert!(!catalog.try_decrement(tee, "XXXL", 1).await.unwrap());
    assert_eq!(catalog.available(tee, "M").await.unwrap(), Some(1));

    catalog.increment(tee, "XXXL", 5).await.unwrap();
    assert_eq!(catalog.available(tee, "XXXL").await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decrements_never_oversell() {
    let Some(pool) = pool().await else { return };
    let tee = seed_variant(&pool, "M", 4).await;
    let catalog = Arc::new(PgCatalog::new(pool));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let catalog = catalog.clone();
            tokio::spawn(async move { catalog.try_decrement(tee, "M", 1).await.unwrap() })
        })
        .collect();
    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            granted += 1;
        }
    }

    assert_eq!(granted, 4);
    assert_eq!(catalog.available(tee, "M").await.unwrap(), Some(0));
}
