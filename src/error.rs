//! Service-boundary error taxonomy.
//!
//! Business-rule failures pass through to the client as `{ "message": .. }`.
//! Infrastructure failures are logged with their full context on conversion
//! and rendered as a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::application::payments::GatewayError;
use crate::application::ports::StoreError;
use crate::application::stock_ledger::StockError;
use crate::domain::aggregates::OrderError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },

    #[error("Insufficient stock for {product} (size {size})")]
    InsufficientStock { product: String, size: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Not authorized to access this order")]
    Forbidden,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{message}")]
    Gateway { message: String, caller_fixable: bool },

    #[error("Invalid webhook signature")]
    SignatureMismatch,

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), errors: vec![] }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. }
            | Self::InsufficientStock { .. }
            | Self::InvalidTransition(_)
            | Self::SignatureMismatch => StatusCode::BAD_REQUEST,
            Self::Gateway { caller_fixable: true, .. } => StatusCode::BAD_REQUEST,
            Self::Gateway { caller_fixable: false, .. } | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation { message, errors } if !errors.is_empty() => {
                json!({ "message": message, "errors": errors })
            }
            other => json!({ "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidTransition { .. } | OrderError::AlreadyPaid => Self::InvalidTransition(e.to_string()),
            OrderError::NoItems | OrderError::InvalidQuantity { .. } | OrderError::UnknownStatus(_) => {
                Self::validation(e.to_string())
            }
        }
    }
}

impl From<StockError> for AppError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::Insufficient { product, size } => Self::InsufficientStock { product, size },
            StockError::Store(store) => store.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "Order store error");
        Self::Internal
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        let caller_fixable = e.is_caller_fixable();
        if caller_fixable {
            tracing::info!(error = %e, "Payment gateway refused request");
        } else {
            tracing::error!(error = %e, "Payment gateway failure");
        }
        Self::Gateway { message: e.client_message(), caller_fixable }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;

    #[test]
    fn test_status_mapping() {
        let transition: AppError =
            OrderError::InvalidTransition { action: "cancel", status: OrderStatus::Shipped }.into();
        assert_eq!(transition.status(), StatusCode::BAD_REQUEST);
        assert_eq!(transition.to_string(), "Cannot cancel an order that is shipped");
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("Order".into()).status(), StatusCode::NOT_FOUND);
        let stock: AppError = StockError::Insufficient { product: "Tee".into(), size: "L".into() }.into();
        assert_eq!(stock.to_string(), "Insufficient stock for Tee (size L)");
        assert_eq!(stock.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_timeout_is_not_caller_fixable() {
        let err: AppError = GatewayError::Timeout.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
