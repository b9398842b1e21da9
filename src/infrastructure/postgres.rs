//! PostgreSQL adapters.
//!
//! Orders are stored as JSONB documents next to the handful of columns that
//! listings filter on. Variant stock lives in `product_variants` with a
//! `quantity >= 0` check; decrements are conditional updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::application::ports::{Catalog, OrderFilter, OrderRepository, OrderStats, ProductSnapshot, StoreError};
use crate::domain::aggregates::Order;
use crate::domain::value_objects::Money;

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    version: i64,
    document: serde_json::Value,
}

impl OrderRow {
    fn into_order(self) -> Result<Order, StoreError> {
        Ok(serde_json::from_value::<Order>(self.document)?.committed(self.version))
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = &filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(is_paid) = filter.is_paid {
        qb.push(" AND is_paid = ").push_bind(is_paid);
    }
    if let Some(is_delivered) = filter.is_delivered {
        qb.push(" AND is_delivered = ").push_bind(is_delivered);
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> Result<Order, StoreError> {
        let stored = order.clone().committed(1);
        let document = serde_json::to_value(&stored)?;
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, status, is_paid, is_delivered, payment_reference,
                total_price, created_at, updated_at, version, document)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(stored.id())
        .bind(stored.order_number())
        .bind(stored.user_id())
        .bind(stored.status().as_str())
        .bind(stored.is_paid())
        .bind(stored.is_delivered())
        .bind(stored.payment_result().map(|p| p.reference_id.clone()))
        .bind(stored.total().amount())
        .bind(stored.created_at())
        .bind(stored.updated_at())
        .bind(stored.version())
        .bind(&document)
        .execute(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn update(&self, order: &Order) -> Result<Order, StoreError> {
        let stored = order.clone().committed(order.version() + 1);
        let document = serde_json::to_value(&stored)?;
        let result = sqlx::query(
            "UPDATE orders SET status = $3, is_paid = $4, is_delivered = $5, payment_reference = $6,
                total_price = $7, updated_at = $8, version = version + 1, document = $9
             WHERE id = $1 AND version = $2",
        )
        .bind(order.id())
        .bind(order.version())
        .bind(stored.status().as_str())
        .bind(stored.is_paid())
        .bind(stored.is_delivered())
        .bind(stored.payment_result().map(|p| p.reference_id.clone()))
        .bind(stored.total().amount())
        .bind(stored.updated_at())
        .bind(&document)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(order.id()));
        }
        Ok(stored)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>("SELECT version, document FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(OrderRow::into_order)
            .transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>("SELECT version, document FROM orders WHERE payment_reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?
            .map(OrderRow::into_order)
            .transpose()
    }

    async fn list(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT version, document FROM orders");
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.skip()).unwrap_or(i64::MAX));
        let rows: Vec<OrderRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let items = rows.into_iter().map(OrderRow::into_order).collect::<Result<Vec<_>, _>>()?;
        Ok(Page { items, total: total.max(0) as u64, request: page })
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> Result<OrderStats, StoreError> {
        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM orders GROUP BY status").fetch_all(&self.pool).await?;
        let (revenue,): (Decimal,) = sqlx::query_as(
            "SELECT COALESCE(SUM(total_price), 0) FROM orders WHERE is_paid AND status <> 'cancelled'",
        )
        .fetch_one(&self.pool)
        .await?;
        let (recent,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE created_at >= $1")
            .bind(recent_since)
            .fetch_one(&self.pool)
            .await?;

        let mut stats = OrderStats { total_revenue: Money::new(revenue), recent_orders: recent.max(0) as u64, ..Default::default() };
        for (status, count) in by_status {
            let count = count.max(0) as u64;
            stats.total_orders += count;
            stats.by_status.insert(status, count);
        }
        Ok(stats)
    }
}

#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    price: Decimal,
    image: Option<String>,
    is_active: bool,
}

fn as_i32(quantity: u32) -> i32 { i32::try_from(quantity).unwrap_or(i32::MAX) }

#[async_trait]
impl Catalog for PgCatalog {
    async fn product(&self, id: Uuid) -> Result<Option<ProductSnapshot>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT id, name, price, image, is_active FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| ProductSnapshot {
            id: r.id,
            name: r.name,
            price: Money::new(r.price),
            image: r.image,
            is_active: r.is_active,
        }))
    }

    async fn available(&self, product_id: Uuid, size: &str) -> Result<Option<u32>, StoreError> {
        let on_hand: Option<i32> =
            sqlx::query_scalar("SELECT quantity FROM product_variants WHERE product_id = $1 AND size = $2")
                .bind(product_id)
                .bind(size)
                .fetch_optional(&self.pool)
                .await?;
        Ok(on_hand.map(|q| u32::try_from(q).unwrap_or(0)))
    }

    async fn try_decrement(&self, product_id: Uuid, size: &str, quantity: u32) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE product_variants SET quantity = quantity - $3, updated_at = NOW()
             WHERE product_id = $1 AND size = $2 AND quantity >= $3",
        )
        .bind(product_id)
        .bind(size)
        .bind(as_i32(quantity))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn increment(&self, product_id: Uuid, size: &str, quantity: u32) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE product_variants SET quantity = quantity + $3, updated_at = NOW()
             WHERE product_id = $1 AND size = $2",
        )
        .bind(product_id)
        .bind(size)
        .bind(as_i32(quantity))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
