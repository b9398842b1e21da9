//! In-process adapters with the same semantics as the PostgreSQL ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::application::ports::{
    Catalog, Notifier, NotifyError, OrderFilter, OrderRepository, OrderStats, ProductSnapshot, StoreError,
};
use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Money, Quantity};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<Order, StoreError> {
        let stored = order.clone().committed(1);
        self.orders.write().await.insert(order.id(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, order: &Order) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().await;
        match orders.get(&order.id()) {
            Some(current) if current.version() == order.version() => {
                let stored = order.clone().committed(order.version() + 1);
                orders.insert(order.id(), stored.clone());
                Ok(stored)
            }
            _ => Err(StoreError::Conflict(order.id())),
        }
    }

    async fn find(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.payment_result().is_some_and(|p| p.reference_id == reference))
            .cloned())
    }

    async fn list(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>, StoreError> {
        let orders = self.orders.read().await;
        let mut matching: Vec<&Order> = orders.values().filter(|o| filter.matches(o)).collect();
        matching.sort_by_key(|o| std::cmp::Reverse((o.created_at(), o.id())));
        let items = matching
            .iter()
            .skip(usize::try_from(page.skip()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .map(|o| (*o).clone())
            .collect();
        Ok(Page { items, total: matching.len() as u64, request: page })
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> Result<OrderStats, StoreError> {
        let orders = self.orders.read().await;
        let mut stats = OrderStats { total_orders: orders.len() as u64, ..Default::default() };
        for order in orders.values() {
            *stats.by_status.entry(order.status().to_string()).or_default() += 1;
            if order.is_paid() && order.status() != OrderStatus::Cancelled {
                stats.total_revenue = stats.total_revenue.add(order.total());
            }
            if order.created_at() >= recent_since {
                stats.recent_orders += 1;
            }
        }
        Ok(stats)
    }
}

/// Catalog keyed by product and variant size.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<Uuid, ProductSnapshot>>,
    stock: Mutex<HashMap<(Uuid, String), Quantity>>,
}

impl InMemoryCatalog {
    pub async fn add_product(&self, name: &str, price: Money, variants: &[(&str, u32)]) -> Uuid {
        let id = Uuid::new_v4();
        let product = ProductSnapshot { id, name: name.to_string(), price, image: None, is_active: true };
        self.products.write().await.insert(id, product);
        let mut stock = self.stock.lock().await;
        for (size, qty) in variants {
            stock.insert((id, size.to_string()), Quantity::new(*qty));
        }
        id
    }

    pub async fn set_active(&self, id: Uuid, active: bool) {
        if let Some(p) = self.products.write().await.get_mut(&id) {
            p.is_active = active;
        }
    }

    pub async fn stock(&self, product_id: Uuid, size: &str) -> Option<u32> {
        self.stock.lock().await.get(&(product_id, size.to_string())).map(Quantity::value)
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, id: Uuid) -> Result<Option<ProductSnapshot>, StoreError> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn available(&self, product_id: Uuid, size: &str) -> Result<Option<u32>, StoreError> {
        Ok(self.stock(product_id, size).await)
    }

    async fn try_decrement(&self, product_id: Uuid, size: &str, quantity: u32) -> Result<bool, StoreError> {
        let mut stock = self.stock.lock().await;
        let Some(on_hand) = stock.get_mut(&(product_id, size.to_string())) else {
            return Ok(false);
        };
        match on_hand.subtract(quantity) {
            Some(left) => {
                *on_hand = left;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment(&self, product_id: Uuid, size: &str, quantity: u32) -> Result<(), StoreError> {
        if let Some(on_hand) = self.stock.lock().await.get_mut(&(product_id, size.to_string())) {
            *on_hand = on_hand.add(quantity);
        }
        Ok(())
    }
}

/// Keeps every event it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<OrderEvent>>,
}

impl RecordingNotifier {
    pub async fn events(&self) -> Vec<OrderEvent> { self.events.lock().await.clone() }

    pub async fn count(&self, name: &str) -> usize {
        self.events.lock().await.iter().filter(|e| e.name() == name).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<(), NotifyError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_leaves_unknown_variants_alone() {
        let catalog = InMemoryCatalog::default();
        let tee = catalog.add_product("Tee", Money::cents(1000), &[("M", 2)]).await;

        catalog.increment(tee, "M", 3).await.unwrap();
        catalog.increment(tee, "XXL", 3).await.unwrap();

        assert_eq!(catalog.stock(tee, "M").await, Some(5));
        assert_eq!(catalog.available(tee, "XXL").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_try_decrement_is_conditional() {
        let catalog = InMemoryCatalog::default();
        let tee = catalog.add_product("Tee", Money::cents(1000), &[("M", 3)]).await;

        assert!(catalog.try_decrement(tee, "M", 2).await.unwrap());
        assert!(!catalog.try_decrement(tee, "M", 2).await.unwrap());
        assert!(!catalog.try_decrement(tee, "L", 1).await.unwrap());
        assert_eq!(catalog.available(tee, "M").await.unwrap(), Some(1));
    }
}
