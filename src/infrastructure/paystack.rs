//! Paystack integration via REST API (no SDK dependency)
//!
//! Amounts cross the wire in kobo; conversion happens here and nowhere else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::application::payments::{
    GatewayError, GatewayEvent, InitializeRequest, PaymentGateway, PaymentSession, VerifiedPayment,
};
use crate::domain::value_objects::{Money, PaymentResult, CURRENCY};

pub const CHARGE_SUCCESS: &str = "charge.success";

#[derive(Clone, Debug)]
pub struct PaystackConfig {
    pub base_url: String,
    pub secret_key: String,
    pub callback_url: Option<String>,
    pub timeout: Duration,
}

/// Every Paystack response is wrapped as `{ status, message, data }`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Customer {
    pub email: Option<String>,
}

/// Transaction record as returned by verify and carried by `charge.*` events.
#[derive(Clone, Debug, Deserialize)]
pub struct TransactionData {
    pub status: String,
    pub reference: String,
    /// Kobo.
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub gateway_response: Option<String>,
    #[serde(default, alias = "paidAt")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer: Option<Customer>,
    /// Object when set by us, but Paystack sends `""` when empty.
    #[serde(default)]
    pub metadata: Value,
}

impl TransactionData {
    pub fn order_id(&self) -> Option<Uuid> {
        ["orderId", "order_id"]
            .iter()
            .find_map(|key| self.metadata.get(key))
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Succeeds only for a `success` transaction.
    pub fn into_verified(self) -> Result<VerifiedPayment, GatewayError> {
        if self.status != "success" {
            return Err(GatewayError::Declined {
                status: self.status,
                response: self.gateway_response.unwrap_or_default(),
            });
        }
        let order_id = self.order_id();
        Ok(VerifiedPayment {
            order_id,
            result: PaymentResult {
                reference_id: self.reference,
                status: self.status,
                confirmed_at: Some(self.paid_at.unwrap_or_else(Utc::now)),
                payer_email: self.customer.and_then(|c| c.email),
                amount: Some(Money::from_minor_units(self.amount)),
                currency: self.currency,
                channel: self.channel,
                gateway_response: self.gateway_response,
            },
        })
    }
}

/// Overall request success and transaction success are both required.
pub fn normalize_verification(envelope: Envelope<TransactionData>) -> Result<VerifiedPayment, GatewayError> {
    if !envelope.status {
        return Err(GatewayError::Rejected(envelope.message));
    }
    envelope
        .data
        .ok_or_else(|| GatewayError::InvalidResponse("verify response without data".into()))?
        .into_verified()
}

#[derive(Debug, Deserialize)]
struct EventBody {
    event: String,
    #[serde(default)]
    data: Option<TransactionData>,
}

/// Decodes a webhook body. Only `charge.success` carries a payment; a
/// `charge.success` for a non-successful transaction is reported as declined.
pub fn parse_event(raw_body: &[u8]) -> Result<GatewayEvent, GatewayError> {
    let body: EventBody =
        serde_json::from_slice(raw_body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    if body.event != CHARGE_SUCCESS {
        return Ok(GatewayEvent::Other(body.event));
    }
    let data = body.data.ok_or_else(|| GatewayError::InvalidResponse("charge.success without data".into()))?;
    data.into_verified().map(GatewayEvent::PaymentSucceeded)
}

fn valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference.len() <= 100
        && reference.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '='))
}

fn map_reqwest(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else if e.is_decode() {
        GatewayError::InvalidResponse(e.to_string())
    } else {
        GatewayError::Transport(e.to_string())
    }
}

pub struct PaystackGateway {
    client: reqwest::Client,
    config: PaystackConfig,
}

impl PaystackGateway {
    pub fn new(config: PaystackConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build().map_err(map_reqwest)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Envelope<T>, GatewayError> {
        let status = resp.status();
        let envelope = resp.json::<Envelope<T>>().await;
        match envelope {
            Ok(envelope) => Ok(envelope),
            Err(_) if status.is_server_error() => Err(GatewayError::Transport(format!("gateway returned {status}"))),
            Err(e) => Err(map_reqwest(e)),
        }
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize(&self, request: &InitializeRequest) -> Result<PaymentSession, GatewayError> {
        let amount = request
            .amount
            .to_minor_units()
            .filter(|kobo| *kobo > 0)
            .ok_or_else(|| GatewayError::Rejected(format!("amount {} cannot be charged", request.amount)))?;
        let mut body = json!({
            "email": request.email,
            "amount": amount,
            "currency": CURRENCY,
            "metadata": { "orderId": request.order_id.to_string() },
        });
        if let Some(callback) = &self.config.callback_url {
            body["callback_url"] = json!(callback);
        }

        let resp = self
            .client
            .post(self.url("transaction/initialize"))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest)?;
        let envelope: Envelope<InitializeData> = Self::read(resp).await?;
        if !envelope.status {
            return Err(GatewayError::Rejected(envelope.message));
        }
        let data = envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("initialize response without data".into()))?;
        tracing::debug!(order_id = %request.order_id, reference = %data.reference, "Paystack transaction initialized");
        Ok(PaymentSession {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<VerifiedPayment, GatewayError> {
        if !valid_reference(reference) {
            return Err(GatewayError::Rejected("invalid payment reference".into()));
        }
        let resp = self
            .client
            .get(self.url(&format!("transaction/verify/{reference}")))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(map_reqwest)?;
        normalize_verification(Self::read(resp).await?)
    }

    fn parse_event(&self, raw_body: &[u8]) -> Result<GatewayEvent, GatewayError> { parse_event(raw_body) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(raw: &str) -> Envelope<TransactionData> {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_successful_verification_is_normalized() {
        let order_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"status":true,"message":"Verification successful","data":{{
                "status":"success","reference":"ref_123","amount":642300,"currency":"NGN",
                "channel":"card","gateway_response":"Successful","paid_at":"2026-01-05T10:00:00.000Z",
                "customer":{{"email":"ada@example.com"}},"metadata":{{"orderId":"{order_id}"}}}}}}"#
        );
        let verified = normalize_verification(envelope(&raw)).unwrap();
        assert_eq!(verified.order_id, Some(order_id));
        assert_eq!(verified.result.amount, Some(Money::cents(642300)));
        assert_eq!(verified.result.payer_email.as_deref(), Some("ada@example.com"));
        assert_eq!(verified.result.channel.as_deref(), Some("card"));
        assert!(verified.result.confirmed_at.is_some());
    }

    #[test]
    fn test_failed_transaction_surfaces_gateway_text() {
        let raw = r#"{"status":true,"message":"Verification successful","data":{
            "status":"failed","reference":"ref_9","amount":100,"gateway_response":"Declined","metadata":""}}"#;
        let err = normalize_verification(envelope(raw)).unwrap_err();
        assert_eq!(err, GatewayError::Declined { status: "failed".into(), response: "Declined".into() });
        assert!(err.client_message().contains("Declined"));
    }

    #[test]
    fn test_request_level_failure_is_rejected() {
        let raw = r#"{"status":false,"message":"Transaction reference not found","data":null}"#;
        assert_eq!(
            normalize_verification(envelope(raw)).unwrap_err(),
            GatewayError::Rejected("Transaction reference not found".into())
        );
    }

    #[test]
    fn test_charge_success_event() {
        let order_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"event":"charge.success","data":{{"status":"success","reference":"ref_7","amount":5000,
                "metadata":{{"orderId":"{order_id}"}}}}}}"#
        );
        let GatewayEvent::PaymentSucceeded(verified) = parse_event(raw.as_bytes()).unwrap() else {
            panic!("expected a payment");
        };
        assert_eq!(verified.order_id, Some(order_id));
        assert_eq!(verified.result.reference_id, "ref_7");
        assert_eq!(verified.result.amount, Some(Money::cents(5000)));
    }

    #[test]
    fn test_other_and_malformed_events() {
        let raw = br#"{"event":"transfer.success","data":{"status":"success","reference":"t","amount":1}}"#;
        assert_eq!(parse_event(raw).unwrap(), GatewayEvent::Other("transfer.success".into()));
        assert!(matches!(parse_event(b"not json"), Err(GatewayError::InvalidResponse(_))));
        assert!(matches!(parse_event(br#"{"event":"charge.success"}"#), Err(GatewayError::InvalidResponse(_))));

        let declined = br#"{"event":"charge.success","data":{"status":"failed","reference":"r","amount":1}}"#;
        assert!(matches!(parse_event(declined), Err(GatewayError::Declined { .. })));
    }

    #[test]
    fn test_reference_charset() {
        assert!(valid_reference("T123_abc-9.x="));
        assert!(!valid_reference("../../admin"));
        assert!(!valid_reference(""));
    }
}
