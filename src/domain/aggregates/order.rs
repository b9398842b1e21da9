//! Order Aggregate
//!
//! The order owns its pricing and its status machine. Callers never assign
//! fields; they hand an [`OrderCommand`] to [`Order::execute`] and get back
//! either a new validated order or `None` when the command was already
//! satisfied (the idempotent case).
//!
//! ```text
//! pending ──> processing ──> shipped ──> delivered
//!    │            │  └──────> refunded
//!    └────────────┴──> cancelled
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Address, Money, PaymentMethod, PaymentResult};

/// Sales tax applied to the items subtotal.
pub const TAX_RATE: Decimal = Decimal::from_parts(85, 0, 0, false, 3);
/// Subtotals strictly above this ship free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        Self::Pending, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled, Self::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Position on the happy path; exits have no rank.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Processing => Some(1),
            Self::Shipped => Some(2),
            Self::Delivered => Some(3),
            Self::Cancelled | Self::Refunded => None,
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match next {
            Self::Cancelled => self.is_cancellable(),
            Self::Refunded => *self == Self::Processing,
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    pub variant_size: String,
    pub variant_color: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub name: String,
    pub image_ref: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

/// Shipping and tax rules. Only the flat fee is deployment-specific.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricingPolicy {
    pub flat_shipping_fee: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self { Self { flat_shipping_fee: Money::cents(1000) } }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub items_price: Money,
    pub tax_price: Money,
    pub shipping_price: Money,
    pub discount_amount: Money,
    pub total_price: Money,
}

impl PriceBreakdown {
    /// Deterministic from the items and the requested discount. The discount
    /// is capped so the total never drops below zero.
    pub fn compute(items: &[OrderItem], discount: Money, policy: &PricingPolicy) -> Self {
        let items_price = items.iter().fold(Money::zero(), |acc, i| acc.add(i.line_total())).round();
        let tax_price = items_price.percent(TAX_RATE);
        let shipping_price = if items_price.amount() > FREE_SHIPPING_THRESHOLD {
            Money::zero()
        } else {
            policy.flat_shipping_fee
        };
        let gross = items_price.add(tax_price).add(shipping_price);
        let discount_amount = if discount > gross { gross } else { discount.round() };
        Self {
            items_price,
            tax_price,
            shipping_price,
            discount_amount,
            total_price: gross.saturating_sub(discount_amount),
        }
    }
}

/// Input for [`Order::create`].
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    pub discount: Money,
}

/// Admin status change with the optional fields that ride along.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderCommand {
    /// Records a gateway session reference before the customer is redirected.
    AttachPayment(PaymentResult),
    /// `stock_reserved` reports whether the caller took stock for a deferred
    /// method just before confirming.
    Pay { result: PaymentResult, stock_reserved: bool },
    Cancel,
    Deliver { tracking_number: Option<String> },
    UpdateStatus(StatusUpdate),
}

impl OrderCommand {
    fn action(&self) -> &'static str {
        match self {
            Self::AttachPayment(_) => "attach payment to",
            Self::Pay { .. } => "pay",
            Self::Cancel => "cancel",
            Self::Deliver { .. } => "deliver",
            Self::UpdateStatus(_) => "update",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    order_number: String,
    user_id: String,
    items: Vec<OrderItem>,
    shipping_address: Address,
    payment_method: PaymentMethod,
    coupon_code: Option<String>,
    #[serde(flatten)]
    pricing: PriceBreakdown,
    status: OrderStatus,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    payment_result: Option<PaymentResult>,
    stock_reserved: bool,
    tracking_number: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

impl Order {
    pub fn create(new: NewOrder, policy: &PricingPolicy, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.items.is_empty() { return Err(OrderError::NoItems); }
        if let Some(item) = new.items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::InvalidQuantity { product: item.name.clone() });
        }
        let id = Uuid::now_v7();
        let pricing = PriceBreakdown::compute(&new.items, new.discount, policy);
        let stock_reserved = !new.payment_method.defers_stock_until_confirmed();
        let mut order = Self {
            id,
            order_number: format!("ORD-{:08X}", rand::random::<u32>()),
            user_id: new.user_id,
            items: new.items,
            shipping_address: new.shipping_address,
            payment_method: new.payment_method,
            coupon_code: new.coupon_code,
            pricing,
            status: OrderStatus::Pending,
            is_paid: false,
            paid_at: None,
            is_delivered: false,
            delivered_at: None,
            payment_result: None,
            stock_reserved,
            tracking_number: None,
            notes: None,
            created_at: now,
            updated_at: now,
            version: 0,
            events: vec![],
        };
        order.raise_event(OrderEvent::Created {
            order_id: id,
            user_id: order.user_id.clone(),
            total: pricing.total_price,
            stock_reserved,
        });
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn pricing(&self) -> &PriceBreakdown { &self.pricing }
    pub fn total(&self) -> Money { self.pricing.total_price }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn is_paid(&self) -> bool { self.is_paid }
    pub fn paid_at(&self) -> Option<DateTime<Utc>> { self.paid_at }
    pub fn is_delivered(&self) -> bool { self.is_delivered }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn payment_result(&self) -> Option<&PaymentResult> { self.payment_result.as_ref() }
    pub fn stock_reserved(&self) -> bool { self.stock_reserved }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn version(&self) -> i64 { self.version }

    /// True when confirming payment must also take stock.
    pub fn needs_stock_on_payment(&self) -> bool {
        !self.is_paid && !self.stock_reserved && self.payment_method.defers_stock_until_confirmed()
    }

    /// Applies a command. `Ok(None)` means the order already reflects it.
    pub fn execute(&self, command: OrderCommand, now: DateTime<Utc>) -> Result<Option<Order>, OrderError> {
        let action = command.action();
        let mut next = self.clone();
        next.events.clear();
        match command {
            OrderCommand::AttachPayment(placeholder) => {
                if self.is_paid { return Err(OrderError::AlreadyPaid); }
                if self.status != OrderStatus::Pending { return Err(self.invalid(action)); }
                next.payment_result = Some(placeholder);
            }
            OrderCommand::Pay { result, stock_reserved } => {
                if self.is_paid { return Ok(None); }
                if matches!(self.status, OrderStatus::Cancelled | OrderStatus::Refunded) {
                    return Err(self.invalid(action));
                }
                next.is_paid = true;
                next.paid_at = Some(now);
                next.stock_reserved = self.stock_reserved || stock_reserved;
                if self.status == OrderStatus::Pending {
                    next.status = OrderStatus::Processing;
                }
                next.raise_event(OrderEvent::Paid {
                    order_id: self.id,
                    reference: result.reference_id.clone(),
                    stock_deferred: self.needs_stock_on_payment(),
                });
                next.payment_result = Some(result);
            }
            OrderCommand::Cancel => {
                if !self.status.is_cancellable() { return Err(self.invalid(action)); }
                next.apply_cancel();
            }
            OrderCommand::Deliver { tracking_number } => {
                if self.status.is_terminal() { return Err(self.invalid(action)); }
                next.apply_delivery(tracking_number, now);
            }
            OrderCommand::UpdateStatus(update) => {
                let target = update.status;
                if target != self.status && !(target == OrderStatus::Delivered && !self.status.is_terminal())
                    && !self.status.can_transition_to(target)
                {
                    return Err(self.invalid(action));
                }
                if let Some(notes) = update.notes { next.notes = Some(notes); }
                match target {
                    _ if target == self.status => {
                        if let Some(tracking) = update.tracking_number { next.tracking_number = Some(tracking); }
                    }
                    OrderStatus::Delivered => next.apply_delivery(update.tracking_number, now),
                    OrderStatus::Cancelled => next.apply_cancel(),
                    _ => {
                        if let Some(tracking) = update.tracking_number { next.tracking_number = Some(tracking); }
                        next.status = target;
                        next.raise_event(OrderEvent::StatusChanged { order_id: self.id, from: self.status, to: target });
                    }
                }
                if next.same_state(self) { return Ok(None); }
            }
        }
        next.updated_at = now;
        Ok(Some(next))
    }

    fn apply_cancel(&mut self) {
        let held = self.stock_reserved;
        self.status = OrderStatus::Cancelled;
        self.stock_reserved = false;
        self.raise_event(OrderEvent::Cancelled { order_id: self.id, stock_reserved: held });
    }

    fn apply_delivery(&mut self, tracking_number: Option<String>, now: DateTime<Utc>) {
        if let Some(tracking) = tracking_number { self.tracking_number = Some(tracking); }
        if !self.is_delivered {
            self.is_delivered = true;
            self.delivered_at = Some(now);
        }
        self.status = OrderStatus::Delivered;
        self.raise_event(OrderEvent::Delivered { order_id: self.id, tracking: self.tracking_number.clone() });
    }

    fn same_state(&self, other: &Order) -> bool {
        self.status == other.status && self.notes == other.notes && self.tracking_number == other.tracking_number
    }

    fn invalid(&self, action: &'static str) -> OrderError {
        OrderError::InvalidTransition { action, status: self.status }
    }

    /// Called by the repository once a write has been accepted.
    pub fn committed(mut self, version: i64) -> Self {
        self.version = version;
        self.events.clear();
        self
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Order must contain at least one item")]
    NoItems,
    #[error("Quantity for {product} must be at least 1")]
    InvalidQuantity { product: String },
    #[error("Cannot {action} an order that is {status}")]
    InvalidTransition { action: &'static str, status: OrderStatus },
    #[error("Order is already paid")]
    AlreadyPaid,
    #[error("Unknown order status '{0}'")]
    UnknownStatus(String),
}
