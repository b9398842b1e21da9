//! Gateway payment endpoints
//!
//! POST /payments/webhook takes the raw body so the signature is checked
//! over exactly the bytes the gateway signed.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::api::{AppState, ValidatedJson};
use crate::application::order_service::InitializePayment;
use crate::application::payments::PaymentSession;
use crate::application::webhook::WebhookError;
use crate::application::Caller;
use crate::domain::aggregates::Order;
use crate::domain::value_objects::PaymentResult;
use crate::error::{AppError, Result};

const SIGNATURE_HEADERS: [&str; 2] = ["x-paystack-signature", "x-signature"];

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    #[validate(length(min = 1, max = 100, message = "reference is required"))]
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub message: &'static str,
    pub order: Order,
    pub payment: Option<PaymentResult>,
}

pub async fn initialize(
    State(state): State<AppState>,
    caller: Caller,
    ValidatedJson(body): ValidatedJson<InitializePayment>,
) -> Result<Json<PaymentSession>> {
    Ok(Json(state.service.initialize_payment(&caller, body).await?))
}

pub async fn verify(
    State(state): State<AppState>,
    caller: Caller,
    ValidatedJson(body): ValidatedJson<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let confirmation = state.service.verify_payment(&caller, body.reference.trim()).await?;
    let message = if confirmation.newly_paid { "Payment verified" } else { "Order already paid" };
    let payment = confirmation.order.payment_result().cloned();
    Ok(Json(VerifyResponse { message, order: confirmation.order, payment }))
}

pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>> {
    let signature = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok());

    match state.webhook.handle(&body, signature).await {
        Ok(ack) => {
            tracing::debug!(?ack, "Webhook acknowledged");
            Ok(Json(json!({ "received": true })))
        }
        Err(WebhookError::MissingSignature | WebhookError::SignatureMismatch) => Err(AppError::SignatureMismatch),
    }
}
