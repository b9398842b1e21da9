//! Stock reservation against the catalog.
//!
//! Each line is a compare-and-decrement on one variant, so concurrent
//! reservations serialize per variant and quantity can never go negative.
//! A batch is all-or-nothing: lines already taken are put back before an
//! error is returned.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::application::ports::{Catalog, StoreError};
use crate::domain::aggregates::OrderItem;

#[derive(Error, Debug)]
pub enum StockError {
    #[error("Insufficient stock for {product} (size {size})")]
    Insufficient { product: String, size: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ReservedLine {
    product_id: Uuid,
    size: String,
    quantity: u32,
}

/// Proof that stock was taken for a set of lines.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use = "a reservation must be committed or released"]
pub struct ReservationToken {
    lines: Vec<ReservedLine>,
}

impl ReservationToken {
    /// Rebuilds the reservation held by an existing order's items.
    pub fn for_items(items: &[OrderItem]) -> Self {
        Self {
            lines: items
                .iter()
                .map(|i| ReservedLine { product_id: i.product_id, size: i.variant_size.clone(), quantity: i.quantity })
                .collect(),
        }
    }

    pub fn units(&self) -> u32 { self.lines.iter().map(|l| l.quantity).sum() }
}

#[derive(Clone)]
pub struct StockLedger {
    catalog: Arc<dyn Catalog>,
}

impl StockLedger {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self { Self { catalog } }

    #[tracing::instrument(skip_all, fields(lines = items.len()))]
    pub async fn reserve(&self, items: &[OrderItem]) -> Result<ReservationToken, StockError> {
        let mut taken = ReservationToken { lines: Vec::with_capacity(items.len()) };
        for item in items {
            let outcome = self.catalog.try_decrement(item.product_id, &item.variant_size, item.quantity).await;
            match outcome {
                Ok(true) => taken.lines.push(ReservedLine {
                    product_id: item.product_id,
                    size: item.variant_size.clone(),
                    quantity: item.quantity,
                }),
                Ok(false) => {
                    self.rollback(taken).await;
                    tracing::info!(product = %item.product_id, size = %item.variant_size, "Insufficient stock");
                    return Err(StockError::Insufficient { product: item.name.clone(), size: item.variant_size.clone() });
                }
                Err(e) => {
                    self.rollback(taken).await;
                    return Err(e.into());
                }
            }
        }
        Ok(taken)
    }

    /// Read-only availability check for orders that take stock later.
    /// Lines for the same variant are summed before comparing.
    #[tracing::instrument(skip_all, fields(lines = items.len()))]
    pub async fn check(&self, items: &[OrderItem]) -> Result<(), StockError> {
        let mut wanted: BTreeMap<(Uuid, &str), (u32, &str)> = BTreeMap::new();
        for item in items {
            let entry = wanted.entry((item.product_id, item.variant_size.as_str())).or_insert((0, item.name.as_str()));
            entry.0 = entry.0.saturating_add(item.quantity);
        }
        for ((product_id, size), (quantity, name)) in wanted {
            let on_hand = self.catalog.available(product_id, size).await?;
            if on_hand.map_or(true, |n| n < quantity) {
                tracing::info!(product = %product_id, size, "Insufficient stock");
                return Err(StockError::Insufficient { product: name.to_string(), size: size.to_string() });
            }
        }
        Ok(())
    }

    /// Puts every line back. The caller guarantees this runs once per
    /// reservation, normally by gating it on an order status transition.
    #[tracing::instrument(skip_all, fields(units = token.units()))]
    pub async fn release(&self, token: ReservationToken) -> Result<(), StockError> {
        for line in &token.lines {
            self.catalog.increment(line.product_id, &line.size, line.quantity).await?;
        }
        Ok(())
    }

    /// Stock was already taken at reserve time; committing only consumes the token.
    pub fn commit(&self, token: ReservationToken) {
        tracing::debug!(units = token.units(), "Reservation committed");
    }

    async fn rollback(&self, taken: ReservationToken) {
        for line in &taken.lines {
            if let Err(e) = self.catalog.increment(line.product_id, &line.size, line.quantity).await {
                tracing::error!(error = %e, product = %line.product_id, size = %line.size, quantity = line.quantity,
                    "Failed to roll back partial reservation");
            }
        }
    }
}
