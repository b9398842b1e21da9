//! Aggregates module
pub mod order;

pub use order::{
    NewOrder, Order, OrderCommand, OrderError, OrderItem, OrderStatus, PriceBreakdown, PricingPolicy,
    StatusUpdate,
};
