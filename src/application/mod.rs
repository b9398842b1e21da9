//! Use cases and the ports they depend on
pub mod coupons;
pub mod order_service;
pub mod pagination;
pub mod payments;
pub mod ports;
pub mod stock_ledger;
pub mod webhook;

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::Order;

pub use order_service::{CancelRestock, Confirmation, OrderService, OrderSettings};
pub use webhook::{Ack, WebhookReconciler};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

/// Authenticated identity handed over by the identity service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn customer(user_id: impl Into<String>) -> Self { Self { user_id: user_id.into(), role: Role::Customer } }
    pub fn admin(user_id: impl Into<String>) -> Self { Self { user_id: user_id.into(), role: Role::Admin } }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    /// Owner or admin.
    pub fn can_access(&self, order: &Order) -> bool {
        self.is_admin() || order.user_id() == self.user_id
    }
}
