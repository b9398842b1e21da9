//! Order endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::api::{AppState, ValidatedJson};
use crate::application::order_service::CreateOrder;
use crate::application::pagination::{Page, PageMeta, PageRequest};
use crate::application::ports::{OrderFilter, OrderStats};
use crate::application::Caller;
use crate::domain::aggregates::{Order, OrderStatus, StatusUpdate};
use crate::domain::value_objects::{Money, PaymentResult};
use crate::error::Result;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub is_paid: Option<bool>,
    pub is_delivered: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ListParams {
    fn status(&self) -> Result<Option<OrderStatus>> {
        Ok(self.status.as_deref().map(str::parse::<OrderStatus>).transpose()?)
    }

    fn page(&self) -> PageRequest { PageRequest::new(self.page, self.limit) }
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
    pub pagination: PageMeta,
}

impl From<Page<Order>> for OrderList {
    fn from(page: Page<Order>) -> Self {
        let pagination = page.meta();
        Self { orders: page.items, pagination }
    }
}

/// Payment details a client reports for a non-gateway method.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    #[serde(alias = "id")]
    #[validate(length(min = 1, message = "payment reference is required"))]
    pub reference_id: String,
    #[validate(length(min = 1, message = "payment status is required"))]
    pub status: String,
    #[serde(alias = "email_address")]
    pub payer_email: Option<String>,
    pub amount: Option<Money>,
    pub channel: Option<String>,
}

impl PayRequest {
    fn into_result(self) -> PaymentResult {
        PaymentResult {
            reference_id: self.reference_id,
            status: self.status,
            confirmed_at: Some(Utc::now()),
            payer_email: self.payer_email,
            amount: self.amount,
            currency: None,
            channel: self.channel,
            gateway_response: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverRequest {
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

pub async fn create_order(
    State(state): State<AppState>,
    caller: Caller,
    ValidatedJson(body): ValidatedJson<CreateOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state.service.create_order(&caller, body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn get_order(State(state): State<AppState>, caller: Caller, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(state.service.get_order(&caller, id).await?))
}

pub async fn pay_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<PayRequest>,
) -> Result<Json<Order>> {
    Ok(Json(state.service.pay_order(&caller, id, body.into_result()).await?))
}

pub async fn deliver_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Option<Json<DeliverRequest>>,
) -> Result<Json<Order>> {
    let tracking_number = body.and_then(|Json(b)| b.tracking_number);
    Ok(Json(state.service.deliver_order(&caller, id, tracking_number).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<StatusRequest>,
) -> Result<Json<Order>> {
    let update = StatusUpdate { status: body.status.parse::<OrderStatus>()?, tracking_number: body.tracking_number, notes: body.notes };
    Ok(Json(state.service.update_order_status(&caller, id, update).await?))
}

pub async fn cancel_order(State(state): State<AppState>, caller: Caller, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(state.service.cancel_order(&caller, id).await?))
}

pub async fn my_orders(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<OrderList>> {
    let page = state.service.list_my_orders(&caller, params.status()?, params.page()).await?;
    Ok(Json(page.into()))
}

pub async fn list_orders(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<OrderList>> {
    let filter = OrderFilter {
        user_id: None,
        status: params.status()?,
        is_paid: params.is_paid,
        is_delivered: params.is_delivered,
        created_from: params.from,
        created_to: params.to,
    };
    Ok(Json(state.service.list_orders(&caller, filter, params.page()).await?.into()))
}

pub async fn stats(State(state): State<AppState>, caller: Caller) -> Result<Json<OrderStats>> {
    Ok(Json(state.service.stats(&caller).await?))
}
