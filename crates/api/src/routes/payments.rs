//! Payment intent and callback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use settlement::PaymentVerification;

use super::orders::{OrderResponse, PaymentOrderResponse, PlaceOrderRequest, place};
use crate::AppState;
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::extract::ApiJson;

/// Callback fields as relayed from the gateway checkout.
///
/// The gateway's own field names are accepted as aliases.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(alias = "razorpay_order_id")]
    pub intent_id: String,
    #[serde(alias = "razorpay_payment_id")]
    pub payment_id: String,
    #[serde(alias = "razorpay_signature")]
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub outcome: &'static str,
    pub order: OrderResponse,
}

impl From<PaymentVerification> for VerifyPaymentResponse {
    fn from(verification: PaymentVerification) -> Self {
        match verification {
            PaymentVerification::Verified(order) => Self {
                outcome: "verified",
                order: order.into(),
            },
            PaymentVerification::AlreadyProcessed(order) => Self {
                outcome: "already_processed",
                order: order.into(),
            },
        }
    }
}

/// POST /create-payment-order
#[tracing::instrument(skip(state, req))]
pub async fn create_payment_order(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    ApiJson(req): ApiJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PaymentOrderResponse>), ApiError> {
    place(&state, &principal, req).await
}

/// POST /verify-payment
///
/// Replays of an applied callback answer 200 with `already_processed`.
#[tracing::instrument(skip(state, req))]
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    ApiJson(req): ApiJson<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let verification = state
        .settlement
        .verify_and_commit(&principal, &req.intent_id, &req.payment_id, &req.signature)
        .await?;
    Ok(Json(verification.into()))
}
