//! Order use cases: create, pay, verify, cancel, deliver, status changes and
//! the role-scoped listings.
//!
//! Every state change runs under a per-order lock and is written back with a
//! version compare-and-swap, so concurrent confirmations of the same payment
//! (verify call racing the webhook) collapse into a single transition.

use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::application::coupons::CouponBook;
use crate::application::pagination::{Page, PageRequest};
use crate::application::payments::{InitializeRequest, PaymentGateway, PaymentSession, VerifiedPayment};
use crate::application::ports::{Catalog, Notifier, OrderFilter, OrderRepository, OrderStats, StoreError};
use crate::application::stock_ledger::{ReservationToken, StockError, StockLedger};
use crate::application::Caller;
use crate::domain::aggregates::{NewOrder, Order, OrderCommand, OrderItem, OrderStatus, PricingPolicy, StatusUpdate};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Address, Money, PaymentMethod, PaymentResult};
use crate::error::{AppError, Result};

const MAX_ATTEMPTS: usize = 3;
const NOTIFY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);
const RECENT_WINDOW_DAYS: i64 = 30;
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Whether cancelling restores stock the order never took.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CancelRestock {
    /// Restore every line on cancel, regardless of payment method.
    #[default]
    Always,
    /// Restore only what the order actually holds.
    ReservedOnly,
}

#[derive(Clone, Debug, Default)]
pub struct OrderSettings {
    pub pricing: PricingPolicy,
    pub coupons: CouponBook,
    pub cancel_restock: CancelRestock,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestedItem {
    pub product_id: Uuid,
    #[validate(length(min = 1, message = "size is required"))]
    pub size: String,
    pub color: Option<String>,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: u32,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    #[validate]
    pub order_items: Vec<RequestedItem>,
    #[validate]
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitializePayment {
    pub order_id: Uuid,
    pub amount: Money,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
}

/// Outcome of a payment confirmation.
#[derive(Clone, Debug)]
pub struct Confirmation {
    pub order: Order,
    /// False when the order was already paid and nothing changed.
    pub newly_paid: bool,
}

#[derive(Default)]
struct OrderLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            if map.len() > LOCK_PRUNE_THRESHOLD {
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            map.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn Catalog>,
    ledger: StockLedger,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    settings: OrderSettings,
    locks: OrderLocks,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn Catalog>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        settings: OrderSettings,
    ) -> Self {
        Self {
            orders,
            ledger: StockLedger::new(catalog.clone()),
            catalog,
            gateway,
            notifier,
            settings,
            locks: OrderLocks::default(),
        }
    }

    #[instrument(skip(self, request), fields(user = %caller.user_id))]
    pub async fn create_order(&self, caller: &Caller, request: CreateOrder) -> Result<Order> {
        let mut items = Vec::with_capacity(request.order_items.len());
        for requested in &request.order_items {
            let product = self
                .catalog
                .product(requested.product_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Product {}", requested.product_id)))?;
            if !product.is_active {
                return Err(AppError::validation(format!("Product {} is not available", product.name)));
            }
            items.push(OrderItem {
                product_id: product.id,
                variant_size: requested.size.clone(),
                variant_color: requested.color.clone(),
                unit_price: product.price,
                quantity: requested.quantity,
                name: product.name,
                image_ref: product.image,
            });
        }

        let items_price = items.iter().fold(Money::zero(), |acc, i| acc.add(i.line_total()));
        let discount = self
            .settings
            .coupons
            .discount_for(request.coupon_code.as_deref(), items_price)
            .map_err(|e| AppError::validation(e.to_string()))?;

        let new = NewOrder {
            user_id: caller.user_id.clone(),
            items,
            shipping_address: request.shipping_address,
            payment_method: request.payment_method,
            coupon_code: request.coupon_code,
            discount,
        };
        let mut order = Order::create(new, &self.settings.pricing, Utc::now())?;

        let reservation = if order.stock_reserved() {
            Some(self.ledger.reserve(order.items()).await?)
        } else {
            self.ledger.check(order.items()).await?;
            None
        };
        let stored = match self.orders.insert(&order).await {
            Ok(stored) => stored,
            Err(e) => {
                self.release_quietly(reservation, order.id()).await;
                return Err(e.into());
            }
        };
        if let Some(token) = reservation {
            self.ledger.commit(token);
        }
        info!(order_id = %stored.id(), total = %stored.total(), method = stored.payment_method().as_str(), "Order created");
        self.notify_all(order.take_events()).await;
        Ok(stored)
    }

    #[instrument(skip(self), fields(user = %caller.user_id))]
    pub async fn get_order(&self, caller: &Caller, id: Uuid) -> Result<Order> {
        let order = self.load(id).await?;
        authorize(caller, &order)?;
        Ok(order)
    }

    /// Marks an order paid with a caller-supplied result. Gateway orders only
    /// accept this from an admin; customers go through verify or the webhook.
    #[instrument(skip(self, result), fields(user = %caller.user_id))]
    pub async fn pay_order(&self, caller: &Caller, id: Uuid, result: PaymentResult) -> Result<Order> {
        let order = self.load(id).await?;
        authorize(caller, &order)?;
        if order.payment_method().defers_stock_until_confirmed() && !caller.is_admin() {
            warn!(order_id = %id, method = order.payment_method().as_str(), "Client-reported payment refused for gateway order");
            return Err(AppError::InvalidTransition(format!(
                "Orders paid with {} must be confirmed through payment verification",
                order.payment_method().as_str()
            )));
        }
        Ok(self.confirm_payment(id, result).await?.order)
    }

    /// Opens a hosted-checkout session and records its reference on the order.
    #[instrument(skip(self, request), fields(user = %caller.user_id, order_id = %request.order_id))]
    pub async fn initialize_payment(&self, caller: &Caller, request: InitializePayment) -> Result<PaymentSession> {
        let order = self.load(request.order_id).await?;
        authorize(caller, &order)?;
        if order.is_paid() {
            return Err(AppError::InvalidTransition("Order is already paid".into()));
        }
        if order.status() != OrderStatus::Pending {
            return Err(AppError::InvalidTransition(format!("Cannot pay for an order that is {}", order.status())));
        }
        if request.amount.round() != order.total() {
            return Err(AppError::validation(format!("Amount does not match order total {}", order.total())));
        }

        let session = self
            .gateway
            .initialize(&InitializeRequest { order_id: order.id(), amount: order.total(), email: request.email.clone() })
            .await?;
        let placeholder = PaymentResult::pending(&session.reference, &request.email);
        self.apply(None, order.id(), OrderCommand::AttachPayment(placeholder)).await?;
        info!(reference = %session.reference, "Payment session opened");
        Ok(session)
    }

    /// Synchronous verification: asks the gateway, then confirms the order.
    /// A gateway failure leaves the order untouched so the client may retry.
    #[instrument(skip(self), fields(user = %caller.user_id))]
    pub async fn verify_payment(&self, caller: &Caller, reference: &str) -> Result<Confirmation> {
        let verified = self.gateway.verify(reference).await?;
        let order = self.resolve(&verified).await?;
        authorize(caller, &order)?;
        self.settle(&order, verified.result).await
    }

    /// Applies a gateway-confirmed payment with no caller attached (webhook path).
    #[instrument(skip(self, verified), fields(reference = %verified.result.reference_id))]
    pub async fn reconcile(&self, verified: VerifiedPayment) -> Result<Confirmation> {
        let order = self.resolve(&verified).await?;
        self.settle(&order, verified.result).await
    }

    /// The single idempotent path to `paid`, shared by every confirmation channel.
    #[instrument(skip(self, result), fields(reference = %result.reference_id))]
    pub async fn confirm_payment(&self, id: Uuid, result: PaymentResult) -> Result<Confirmation> {
        let _guard = self.locks.acquire(id).await;
        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.load(id).await?;
            if current.is_paid() {
                info!(order_id = %id, "Order already paid, confirmation ignored");
                return Ok(Confirmation { order: current, newly_paid: false });
            }

            let reservation = if current.needs_stock_on_payment() {
                match self.ledger.reserve(current.items()).await {
                    Ok(token) => Some(token),
                    Err(StockError::Insufficient { product, size }) => {
                        error!(order_id = %id, %product, %size, "Paid order could not reserve stock, needs manual follow-up");
                        None
                    }
                    Err(StockError::Store(e)) => return Err(e.into()),
                }
            } else {
                None
            };

            let command = OrderCommand::Pay { result: result.clone(), stock_reserved: reservation.is_some() };
            let mut next = match current.execute(command, Utc::now()) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    self.release_quietly(reservation, id).await;
                    return Ok(Confirmation { order: current, newly_paid: false });
                }
                Err(e) => {
                    self.release_quietly(reservation, id).await;
                    return Err(e.into());
                }
            };

            match self.orders.update(&next).await {
                Ok(stored) => {
                    if let Some(token) = reservation {
                        self.ledger.commit(token);
                    }
                    info!(order_id = %id, "Order paid");
                    self.after_commit(&stored, next.take_events()).await;
                    return Ok(Confirmation { order: stored, newly_paid: true });
                }
                Err(StoreError::Conflict(_)) => {
                    self.release_quietly(reservation, id).await;
                    warn!(order_id = %id, attempt, "Concurrent update while confirming payment, retrying");
                }
                Err(e) => {
                    self.release_quietly(reservation, id).await;
                    return Err(e.into());
                }
            }
        }
        Err(StoreError::Conflict(id).into())
    }

    #[instrument(skip(self), fields(user = %caller.user_id))]
    pub async fn cancel_order(&self, caller: &Caller, id: Uuid) -> Result<Order> {
        self.apply(Some(caller), id, OrderCommand::Cancel).await
    }

    #[instrument(skip(self), fields(user = %caller.user_id))]
    pub async fn deliver_order(&self, caller: &Caller, id: Uuid, tracking_number: Option<String>) -> Result<Order> {
        require_admin(caller)?;
        self.apply(None, id, OrderCommand::Deliver { tracking_number }).await
    }

    #[instrument(skip(self, update), fields(user = %caller.user_id, status = %update.status))]
    pub async fn update_order_status(&self, caller: &Caller, id: Uuid, update: StatusUpdate) -> Result<Order> {
        require_admin(caller)?;
        self.apply(None, id, OrderCommand::UpdateStatus(update)).await
    }

    pub async fn list_my_orders(
        &self,
        caller: &Caller,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        let filter = OrderFilter { status, ..OrderFilter::for_user(caller.user_id.clone()) };
        Ok(self.orders.list(&filter, page).await?)
    }

    pub async fn list_orders(&self, caller: &Caller, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        require_admin(caller)?;
        Ok(self.orders.list(&filter, page).await?)
    }

    pub async fn stats(&self, caller: &Caller) -> Result<OrderStats> {
        require_admin(caller)?;
        Ok(self.orders.stats(Utc::now() - Duration::days(RECENT_WINDOW_DAYS)).await?)
    }

    /// Runs a command under the order lock, retrying on version conflicts.
    /// `caller` is checked against the freshly loaded order when given.
    async fn apply(&self, caller: Option<&Caller>, id: Uuid, command: OrderCommand) -> Result<Order> {
        let _guard = self.locks.acquire(id).await;
        for attempt in 1..=MAX_ATTEMPTS {
            let current = self.load(id).await?;
            if let Some(caller) = caller {
                authorize(caller, &current)?;
            }
            let Some(mut next) = current.execute(command.clone(), Utc::now())? else {
                return Ok(current);
            };
            match self.orders.update(&next).await {
                Ok(stored) => {
                    self.after_commit(&stored, next.take_events()).await;
                    return Ok(stored);
                }
                Err(StoreError::Conflict(_)) => {
                    warn!(order_id = %id, attempt, "Concurrent order update, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Conflict(id).into())
    }

    /// Side effects of a committed transition. Failures here are logged; the
    /// transition itself already happened.
    async fn after_commit(&self, order: &Order, events: Vec<OrderEvent>) {
        for event in &events {
            if let OrderEvent::Cancelled { order_id, stock_reserved } = event {
                let restock = match self.settings.cancel_restock {
                    CancelRestock::Always => true,
                    CancelRestock::ReservedOnly => *stock_reserved,
                };
                if restock && !stock_reserved {
                    warn!(order_id = %order_id, "Restoring stock this order never took");
                }
                if restock {
                    self.release_quietly(Some(ReservationToken::for_items(order.items())), *order_id).await;
                    info!(order_id = %order_id, "Stock restored for cancelled order");
                }
            }
        }
        self.notify_all(events).await;
    }

    async fn notify_all(&self, events: Vec<OrderEvent>) {
        for event in events {
            match tokio::time::timeout(NOTIFY_TIMEOUT, self.notifier.notify(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, event = event.name(), order_id = %event.order_id(), "Notification failed"),
                Err(_) => warn!(event = event.name(), order_id = %event.order_id(), "Notification timed out"),
            }
        }
    }

    async fn release_quietly(&self, reservation: Option<ReservationToken>, order_id: Uuid) {
        if let Some(token) = reservation {
            if let Err(e) = self.ledger.release(token).await {
                error!(error = %e, order_id = %order_id, "Failed to release stock");
            }
        }
    }

    async fn resolve(&self, verified: &VerifiedPayment) -> Result<Order> {
        if let Some(id) = verified.order_id {
            if let Some(order) = self.orders.find(id).await? {
                return Ok(order);
            }
        }
        self.orders
            .find_by_reference(&verified.result.reference_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".into()))
    }

    async fn settle(&self, order: &Order, result: PaymentResult) -> Result<Confirmation> {
        if let Some(amount) = result.amount {
            if amount < order.total() && !order.is_paid() {
                warn!(order_id = %order.id(), paid = %amount, total = %order.total(), "Underpaid gateway transaction");
                return Err(AppError::validation(format!(
                    "Paid amount {amount} does not cover order total {}",
                    order.total()
                )));
            }
        }
        self.confirm_payment(order.id(), result).await
    }

    async fn load(&self, id: Uuid) -> Result<Order> {
        self.orders.find(id).await?.ok_or_else(|| AppError::NotFound("Order".into()))
    }
}

fn authorize(caller: &Caller, order: &Order) -> Result<()> {
    if caller.can_access(order) { Ok(()) } else { Err(AppError::Forbidden) }
}

fn require_admin(caller: &Caller) -> Result<()> {
    if caller.is_admin() { Ok(()) } else { Err(AppError::Forbidden) }
}
