//! Domain events
use crate::domain::aggregates::order::OrderStatus;
use crate::domain::value_objects::Money;
use serde::Serialize;
use uuid::Uuid;

/// Facts raised by the order aggregate. The service drains them after a
/// successful write to drive stock and notification side effects.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, user_id: String, total: Money, stock_reserved: bool },
    Paid { order_id: Uuid, reference: String, stock_deferred: bool },
    Cancelled { order_id: Uuid, stock_reserved: bool },
    Delivered { order_id: Uuid, tracking: Option<String> },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}

impl OrderEvent {
    /// Subject suffix used when the event is published.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Paid { .. } => "paid",
            Self::Cancelled { .. } => "cancelled",
            Self::Delivered { .. } => "delivered",
            Self::StatusChanged { .. } => "status_changed",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. }
            | Self::Paid { order_id, .. }
            | Self::Cancelled { order_id, .. }
            | Self::Delivered { order_id, .. }
            | Self::StatusChanged { order_id, .. } => *order_id,
        }
    }
}
