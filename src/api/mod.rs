//! HTTP surface

pub mod auth;
pub mod orders;
pub mod payments;

use axum::extract::{FromRequest, Request};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::application::{OrderService, WebhookReconciler};
use crate::error::AppError;

pub use auth::TokenVerifier;

pub const SERVICE_NAME: &str = "opensase-orders";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
    pub webhook: Arc<WebhookReconciler>,
    pub tokens: Arc<TokenVerifier>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/myorders", get(orders::my_orders))
        .route("/orders/stats", get(orders::stats))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/pay", put(orders::pay_order))
        .route("/orders/:id/deliver", put(orders::deliver_order))
        .route("/orders/:id/status", put(orders::update_status))
        .route("/orders/:id/cancel", put(orders::cancel_order))
        .route("/payments/initialize", post(payments::initialize))
        .route("/payments/verify", post(payments::verify))
        .route("/payments/webhook", post(payments::webhook));

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": SERVICE_NAME})) }))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// JSON body that has passed its `validator` rules.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::validation(rejection.body_text()))?;
        value.validate().map_err(|errors| {
            let mut messages = Vec::new();
            flatten(&errors, "", &mut messages);
            messages.sort();
            AppError::Validation { message: "Validation failed".into(), errors: messages }
        })?;
        Ok(Self(value))
    }
}

fn flatten(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() { field.to_string() } else { format!("{prefix}.{field}") };
        match kind {
            ValidationErrorsKind::Field(list) => out.extend(list.iter().map(|e| match &e.message {
                Some(message) => format!("{path}: {message}"),
                None => format!("{path}: {}", e.code),
            })),
            ValidationErrorsKind::Struct(inner) => flatten(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten(inner, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}
