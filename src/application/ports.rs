//! Storage and collaborator ports the order service is written against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::Money;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The stored version moved on since the order was read.
    #[error("order {0} was modified concurrently")]
    Conflict(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderFilter {
    pub user_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub is_paid: Option<bool>,
    pub is_delivered: Option<bool>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self { user_id: Some(user_id.into()), ..Default::default() }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.as_deref().map_or(true, |u| order.user_id() == u)
            && self.status.map_or(true, |s| order.status() == s)
            && self.is_paid.map_or(true, |p| order.is_paid() == p)
            && self.is_delivered.map_or(true, |d| order.is_delivered() == d)
            && self.created_from.map_or(true, |from| order.created_at() >= from)
            && self.created_to.map_or(true, |to| order.created_at() <= to)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_orders: u64,
    pub by_status: BTreeMap<String, u64>,
    /// Paid, non-cancelled orders only.
    pub total_revenue: Money,
    pub recent_orders: u64,
}

/// Order documents. Every `update` is a compare-and-swap on the version the
/// order was read at.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<Order, StoreError>;
    async fn update(&self, order: &Order) -> Result<Order, StoreError>;
    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, StoreError>;
    async fn list(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>, StoreError>;
    async fn stats(&self, recent_since: DateTime<Utc>) -> Result<OrderStats, StoreError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub image: Option<String>,
    pub is_active: bool,
}

/// Catalog view of products and per-variant stock.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: Uuid) -> Result<Option<ProductSnapshot>, StoreError>;
    /// Units on hand for a variant, `None` when the variant does not exist.
    async fn available(&self, product_id: Uuid, size: &str) -> Result<Option<u32>, StoreError>;
    /// Decrements only if at least `quantity` is on hand. Returns whether it did.
    async fn try_decrement(&self, product_id: Uuid, size: &str, quantity: u32) -> Result<bool, StoreError>;
    /// Adds back to an existing variant. Unknown variants are left alone.
    async fn increment(&self, product_id: Uuid, size: &str, quantity: u32) -> Result<(), StoreError>;
}

#[derive(Error, Debug)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Best-effort delivery of order events to whoever sends mail and pushes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &OrderEvent) -> Result<(), NotifyError>;
}
