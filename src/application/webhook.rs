//! Asynchronous payment notifications.
//!
//! The signature is checked over the exact raw body before anything is
//! parsed or looked up. Once it passes, the gateway always gets an ack:
//! reconciliation failures are logged here and never reported back, since a
//! non-2xx answer only makes the gateway retry.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::application::payments::{GatewayEvent, PaymentGateway};
use crate::application::OrderService;

type HmacSha512 = Hmac<Sha512>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,
    #[error("signature mismatch")]
    SignatureMismatch,
}

/// What happened to an authenticated event. Every variant is acknowledged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ack {
    Applied(Uuid),
    AlreadyPaid(Uuid),
    Ignored,
    Failed,
}

/// Constant-time comparison against the hex signature header.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub struct WebhookReconciler {
    secret: String,
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<OrderService>,
}

impl WebhookReconciler {
    pub fn new(secret: impl Into<String>, gateway: Arc<dyn PaymentGateway>, orders: Arc<OrderService>) -> Self {
        Self { secret: secret.into(), gateway, orders }
    }

    #[tracing::instrument(skip_all, fields(bytes = raw_body.len()))]
    pub async fn handle(&self, raw_body: &[u8], signature: Option<&str>) -> Result<Ack, WebhookError> {
        let signature = signature.ok_or_else(|| {
            tracing::warn!("Webhook without signature header");
            WebhookError::MissingSignature
        })?;
        if !verify_signature(&self.secret, raw_body, signature) {
            tracing::warn!("Webhook signature verification failed, possible forgery attempt");
            return Err(WebhookError::SignatureMismatch);
        }

        let verified = match self.gateway.parse_event(raw_body) {
            Ok(GatewayEvent::PaymentSucceeded(verified)) => verified,
            Ok(GatewayEvent::Other(event_type)) => {
                tracing::debug!(%event_type, "Unhandled webhook event type");
                return Ok(Ack::Ignored);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Signed webhook carries no usable payment");
                return Ok(Ack::Ignored);
            }
        };
        let reference = verified.result.reference_id.clone();

        match self.orders.reconcile(verified).await {
            Ok(confirmation) if confirmation.newly_paid => {
                tracing::info!(order_id = %confirmation.order.id(), %reference, "Order paid via webhook");
                Ok(Ack::Applied(confirmation.order.id()))
            }
            Ok(confirmation) => Ok(Ack::AlreadyPaid(confirmation.order.id())),
            Err(e) => {
                tracing::error!(%reference, error = %e, "Webhook reconciliation failed");
                Ok(Ack::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sk_test_webhook";

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"event":"charge.success"}"#;
        assert!(verify_signature(SECRET, body, &sign(SECRET, body)));
    }

    #[test]
    fn test_modified_payload_is_rejected() {
        let signed = br#"{"event":"charge.success","data":{"amount":100}}"#;
        let tampered = br#"{"event":"charge.success","data":{"amount":999}}"#;
        assert!(!verify_signature(SECRET, tampered, &sign(SECRET, signed)));
    }

    #[test]
    fn test_wrong_secret_and_garbage_header() {
        let body = b"{}";
        assert!(!verify_signature(SECRET, body, &sign("other", body)));
        assert!(!verify_signature(SECRET, body, "not-hex"));
        assert!(!verify_signature(SECRET, body, ""));
    }
}
