//! Payment gateway port.
//!
//! Adapters own the wire format and the smallest-currency-unit conversion;
//! callers only ever see [`Money`] and a normalized [`PaymentResult`].

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{Money, PaymentResult};

#[derive(Clone, Debug, PartialEq)]
pub struct InitializeRequest {
    pub order_id: Uuid,
    pub amount: Money,
    pub email: String,
}

/// Hosted-checkout session returned by the gateway.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// A transaction the gateway reports as successful.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedPayment {
    /// Order id the session was opened for, when the gateway echoes it back.
    pub order_id: Option<Uuid>,
    pub result: PaymentResult,
}

/// A signed gateway notification, decoded by the adapter that owns its format.
#[derive(Clone, Debug, PartialEq)]
pub enum GatewayEvent {
    PaymentSucceeded(VerifiedPayment),
    /// Any event type the service does not act on.
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The gateway answered but the transaction did not succeed.
    #[error("transaction {status}: {response}")]
    Declined { status: String, response: String },
    /// The gateway refused the request itself (bad reference, bad amount).
    #[error("gateway rejected request: {0}")]
    Rejected(String),
    #[error("gateway timed out")]
    Timeout,
    #[error("gateway unreachable: {0}")]
    Transport(String),
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn is_caller_fixable(&self) -> bool {
        matches!(self, Self::Declined { .. } | Self::Rejected(_))
    }

    /// Text safe to return to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::Declined { status, response } => format!("Payment verification failed: {status} - {response}"),
            Self::Rejected(message) => format!("Payment gateway rejected the request: {message}"),
            Self::Timeout | Self::Transport(_) => {
                "Payment gateway is unavailable, please retry verification later".to_string()
            }
            Self::InvalidResponse(_) => "Payment gateway returned an unexpected response".to_string(),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &InitializeRequest) -> Result<PaymentSession, GatewayError>;
    async fn verify(&self, reference: &str) -> Result<VerifiedPayment, GatewayError>;
    /// Decodes an already authenticated webhook body.
    fn parse_event(&self, raw_body: &[u8]) -> Result<GatewayEvent, GatewayError>;
}
