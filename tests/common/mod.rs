#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha512;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use opensase_orders::api::{self, AppState, TokenVerifier};
use opensase_orders::application::payments::{
    GatewayError, GatewayEvent, InitializeRequest, PaymentGateway, PaymentSession, VerifiedPayment,
};
use opensase_orders::application::{OrderService, OrderSettings, Role, WebhookReconciler};
use opensase_orders::domain::value_objects::{Money, PaymentResult};
use opensase_orders::infrastructure::memory::{InMemoryCatalog, InMemoryOrderRepository, RecordingNotifier};
use opensase_orders::infrastructure::paystack;

pub const WEBHOOK_SECRET: &str = "sk_test_orders_webhook";
pub const JWT_SECRET: &str = "jwt-test-secret";

/// Gateway double: remembers opened sessions and reports them paid on verify.
#[derive(Default)]
pub struct FakeGateway {
    sessions: Mutex<HashMap<String, (Uuid, Money)>>,
    failure: Mutex<Option<GatewayError>>,
    paid_override: Mutex<Option<Money>>,
    verify_calls: Mutex<usize>,
}

impl FakeGateway {
    pub fn fail_with(&self, error: GatewayError) { *self.failure.lock().unwrap() = Some(error); }
    pub fn recover(&self) { *self.failure.lock().unwrap() = None; }
    pub fn report_paid_amount(&self, amount: Money) { *self.paid_override.lock().unwrap() = Some(amount); }
    pub fn verify_calls(&self) -> usize { *self.verify_calls.lock().unwrap() }

    pub fn charged(&self, reference: &str) -> Option<Money> {
        self.sessions.lock().unwrap().get(reference).map(|(_, amount)| *amount)
    }

    /// Registers a session opened outside this process.
    pub fn open(&self, reference: &str, order_id: Uuid, amount: Money) {
        self.sessions.lock().unwrap().insert(reference.to_string(), (order_id, amount));
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize(&self, request: &InitializeRequest) -> Result<PaymentSession, GatewayError> {
        let failure = self.failure.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        let reference = format!("ref_{}", Uuid::new_v4().simple());
        self.open(&reference, request.order_id, request.amount);
        Ok(PaymentSession {
            authorization_url: format!("https://checkout.test/{reference}"),
            access_code: "ac_test".into(),
            reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedPayment, GatewayError> {
        *self.verify_calls.lock().unwrap() += 1;
        let failure = self.failure.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        let (order_id, amount) = self
            .sessions
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .ok_or_else(|| GatewayError::Rejected("Transaction reference not found".into()))?;
        let paid = self.paid_override.lock().unwrap().unwrap_or(amount);
        Ok(VerifiedPayment { order_id: Some(order_id), result: success(reference, paid) })
    }

    fn parse_event(&self, raw_body: &[u8]) -> Result<GatewayEvent, GatewayError> { paystack::parse_event(raw_body) }
}

pub fn success(reference: &str, amount: Money) -> PaymentResult {
    PaymentResult {
        reference_id: reference.to_string(),
        status: "success".into(),
        confirmed_at: Some(Utc::now()),
        payer_email: Some("buyer@example.com".into()),
        amount: Some(amount),
        currency: Some("NGN".into()),
        channel: Some("card".into()),
        gateway_response: Some("Approved".into()),
    }
}

pub struct TestApp {
    pub router: Router,
    pub service: Arc<OrderService>,
    pub webhook: Arc<WebhookReconciler>,
    pub catalog: Arc<InMemoryCatalog>,
    pub orders: Arc<InMemoryOrderRepository>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub tokens: Arc<TokenVerifier>,
}

impl TestApp {
    pub fn new() -> Self { Self::with_settings(OrderSettings::default()) }

    pub fn with_settings(settings: OrderSettings) -> Self {
        let catalog = Arc::new(InMemoryCatalog::default());
        let orders = Arc::new(InMemoryOrderRepository::default());
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = Arc::new(OrderService::new(
            orders.clone(),
            catalog.clone(),
            gateway.clone(),
            notifier.clone(),
            settings,
        ));
        let webhook = Arc::new(WebhookReconciler::new(WEBHOOK_SECRET, gateway.clone(), service.clone()));
        let tokens = Arc::new(TokenVerifier::new(JWT_SECRET));
        let router =
            api::router(AppState { service: service.clone(), webhook: webhook.clone(), tokens: tokens.clone() });
        Self { router, service, webhook, catalog, orders, gateway, notifier, tokens }
    }

    pub fn token(&self, user_id: &str, role: Role) -> String { self.tokens.issue(user_id, role).unwrap() }
    pub fn customer(&self, user_id: &str) -> String { self.token(user_id, Role::Customer) }
    pub fn admin(&self) -> String { self.token("admin-1", Role::Admin) }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn webhook(&self, raw: &str, signature: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-paystack-signature", signature);
        }
        self.send(builder.body(Body::from(raw.to_string())).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, body)
    }
}

pub fn sign(body: &str) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn charge_success(reference: &str, order_id: Uuid, kobo: i64) -> String {
    json!({
        "event": "charge.success",
        "data": {
            "status": "success",
            "reference": reference,
            "amount": kobo,
            "currency": "NGN",
            "channel": "card",
            "gateway_response": "Successful",
            "paid_at": "2026-10-19T10:00:00Z",
            "customer": { "email": "buyer@example.com" },
            "metadata": { "orderId": order_id.to_string() }
        }
    })
    .to_string()
}

pub fn address() -> Value {
    json!({ "street": "12 Marina Road", "city": "Lagos", "state": "Lagos", "zip": "101001", "country": "NG" })
}

pub fn order_body(items: &[(Uuid, &str, u32)], payment_method: &str) -> Value {
    let items: Vec<Value> = items
        .iter()
        .map(|(product, size, quantity)| json!({ "productId": product, "size": size, "quantity": quantity }))
        .collect();
    json!({ "orderItems": items, "shippingAddress": address(), "paymentMethod": payment_method })
}

pub fn id_of(order: &Value) -> Uuid { order["id"].as_str().unwrap().parse().unwrap() }

pub fn money(value: &Value) -> f64 { value.as_f64().unwrap() }
