//! Order placement and buyer order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::{
    CompostListingId, Currency, Money, Order, OrderId, OrderStatus, Principal, Quantity,
    ReconciliationReason,
};
use serde::{Deserialize, Serialize};
use settlement::OrderRequest;

use super::parse_id;
use crate::AppState;
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::extract::ApiJson;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub compost_listing_id: String,
    pub quantity_kg: f64,
    /// Client's expected total in minor units. Checked, never trusted.
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

impl PlaceOrderRequest {
    fn into_order_request(self) -> Result<OrderRequest, ApiError> {
        let compost_listing_id: CompostListingId =
            parse_id(&self.compost_listing_id, "compost listing")?;
        Ok(OrderRequest {
            compost_listing_id,
            quantity: Quantity::positive_from_kg(self.quantity_kg)?,
            expected_amount: self.amount.map(Money::from_minor_units),
            expected_currency: self
                .currency
                .as_deref()
                .map(str::parse::<Currency>)
                .transpose()?,
        })
    }
}

// -- Response types --

/// Returned when an order and its payment intent are opened.
#[derive(Debug, Serialize)]
pub struct PaymentOrderResponse {
    pub order_id: String,
    pub intent_id: String,
    /// Minor units.
    pub amount: i64,
    pub currency: Currency,
}

impl From<&Order> for PaymentOrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id.to_string(),
            intent_id: order.intent_id().to_string(),
            amount: order.total_price.minor_units(),
            currency: order.currency,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer_id: String,
    pub compost_listing_id: String,
    pub quantity_kg: f64,
    pub total_price: f64,
    pub amount: i64,
    pub currency: Currency,
    pub status: OrderStatus,
    pub intent_id: String,
    pub payment_id: Option<String>,
    pub reconciliation: Option<ReconciliationReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            buyer_id: order.buyer_id.to_string(),
            compost_listing_id: order.compost_listing_id.to_string(),
            quantity_kg: order.quantity.as_kg(),
            total_price: order.total_price.as_major(order.currency),
            amount: order.total_price.minor_units(),
            currency: order.currency,
            status: order.status,
            intent_id: order.payment.intent_id,
            payment_id: order.payment.payment_id,
            reconciliation: order.reconciliation,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// -- Handlers --

/// Prices the order, opens the payment intent and records the pending order.
pub(crate) async fn place(
    state: &AppState,
    principal: &Principal,
    req: PlaceOrderRequest,
) -> Result<(StatusCode, Json<PaymentOrderResponse>), ApiError> {
    let request = req.into_order_request()?;
    let order = state.settlement.create_order(principal, request).await?;
    Ok((StatusCode::CREATED, Json(PaymentOrderResponse::from(&order))))
}

/// POST /orders/
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    ApiJson(req): ApiJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PaymentOrderResponse>), ApiError> {
    place(&state, &principal, req).await
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id, "order")?;
    let order = state.settlement.get_order(&principal, id).await?;
    Ok(Json(order.into()))
}

/// GET /users/me/orders
#[tracing::instrument(skip(state))]
pub async fn list_mine(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.settlement.list_orders_for_buyer(&principal).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}
