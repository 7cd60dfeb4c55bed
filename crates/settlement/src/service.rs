//! Order creation and exactly-once payment settlement.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use domain::{
    Capability, CompostListingId, Currency, Money, Order, OrderId, OrderStatus, PaymentCapture,
    Principal, Quantity, ValidationError,
};
use serde::{Deserialize, Serialize};
use store::{MarketStore, Settlement};

use crate::error::SettlementError;
use crate::gateway::{GatewayError, IntentRequest, PaymentGateway};
use crate::signature::SignatureVerifier;

/// Tunables for the settlement service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Currency every order is priced and collected in.
    pub currency: Currency,
    /// Upper bound on a single gateway call.
    pub gateway_timeout: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            currency: Currency::Inr,
            gateway_timeout: Duration::from_secs(10),
        }
    }
}

/// A buyer's request to purchase compost.
///
/// `expected_amount` and `expected_currency` are what the client believes the
/// order costs. The server always computes the price itself and rejects the
/// request if a supplied value disagrees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub compost_listing_id: CompostListingId,
    pub quantity: Quantity,
    pub expected_amount: Option<Money>,
    pub expected_currency: Option<Currency>,
}

impl OrderRequest {
    pub fn new(compost_listing_id: CompostListingId, quantity: Quantity) -> Self {
        Self {
            compost_listing_id,
            quantity,
            expected_amount: None,
            expected_currency: None,
        }
    }
}

/// Successful outcome of a payment callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "order", rename_all = "snake_case")]
pub enum PaymentVerification {
    /// This callback settled the order.
    Verified(Order),
    /// The payment had already been applied; nothing changed.
    AlreadyProcessed(Order),
}

impl PaymentVerification {
    pub fn order(&self) -> &Order {
        match self {
            PaymentVerification::Verified(order) | PaymentVerification::AlreadyProcessed(order) => {
                order
            }
        }
    }
}

/// Opens payment intents for compost orders and settles them when the
/// gateway's signed callback arrives.
///
/// The gateway is only ever called before any row is written, and no store
/// lock is held across it. Settlement itself is delegated to
/// [`MarketStore::settle`], which applies the idempotency check, the stock
/// re-check, the decrement and the status change as one unit.
pub struct SettlementService<S: MarketStore + ?Sized, G: PaymentGateway + ?Sized> {
    store: Arc<S>,
    gateway: Arc<G>,
    verifier: SignatureVerifier,
    config: SettlementConfig,
}

impl<S: MarketStore + ?Sized, G: PaymentGateway + ?Sized> Clone for SettlementService<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            gateway: self.gateway.clone(),
            verifier: self.verifier.clone(),
            config: self.config,
        }
    }
}

impl<S: MarketStore + ?Sized, G: PaymentGateway + ?Sized> SettlementService<S, G> {
    pub fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        verifier: SignatureVerifier,
        config: SettlementConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Prices the request, opens a payment intent and records a pending order.
    ///
    /// The stock check here is optimistic; the binding check happens at
    /// settlement. If the gateway fails or times out no order is written.
    #[tracing::instrument(skip(self), fields(buyer = %principal.id))]
    pub async fn create_order(
        &self,
        principal: &Principal,
        request: OrderRequest,
    ) -> Result<Order, SettlementError> {
        principal.authorize(Capability::PlaceOrder)?;

        let result = self.open_order(principal, request).await;
        let outcome = match &result {
            Ok(_) => "created",
            Err(SettlementError::Gateway(_)) => "gateway_unavailable",
            Err(_) => "rejected",
        };
        metrics::counter!("payment_intents_total", "outcome" => outcome).increment(1);

        let order = result?;
        tracing::info!(
            order_id = %order.id,
            intent_id = %order.intent_id(),
            amount = %order.total_price,
            "payment order created"
        );
        Ok(order)
    }

    async fn open_order(
        &self,
        principal: &Principal,
        request: OrderRequest,
    ) -> Result<Order, SettlementError> {
        if !request.quantity.is_positive() {
            return Err(ValidationError::NonPositiveQuantity.into());
        }

        let listing = self
            .store
            .get_compost_listing(request.compost_listing_id)
            .await?
            .ok_or_else(|| {
                SettlementError::not_found("compost listing", request.compost_listing_id)
            })?;
        listing.ensure_available(request.quantity)?;

        let amount = listing.quote(request.quantity)?;
        if !amount.is_positive() {
            return Err(ValidationError::InvalidAmount { value: 0.0 }.into());
        }
        let currency = self.config.currency;
        if let Some(expected) = request.expected_amount
            && expected != amount
        {
            return Err(ValidationError::Mismatch {
                field: "amount",
                expected: amount.minor_units().to_string(),
                actual: expected.minor_units().to_string(),
            }
            .into());
        }
        if let Some(expected) = request.expected_currency
            && expected != currency
        {
            return Err(ValidationError::Mismatch {
                field: "currency",
                expected: currency.to_string(),
                actual: expected.to_string(),
            }
            .into());
        }

        let order_id = OrderId::new();
        let intent_request = IntentRequest {
            amount,
            currency,
            receipt: order_id.to_string(),
        };
        let intent = tokio::time::timeout(
            self.config.gateway_timeout,
            self.gateway.create_intent(intent_request),
        )
        .await
        .map_err(|_| GatewayError::Timeout(self.config.gateway_timeout))??;

        if intent.amount != amount || intent.currency != currency {
            return Err(GatewayError::InvalidResponse(format!(
                "intent {} is for {} {}, expected {} {}",
                intent.intent_id, intent.amount, intent.currency, amount, currency
            ))
            .into());
        }

        let order = Order {
            id: order_id,
            ..Order::pending(
                principal.id,
                listing.id,
                request.quantity,
                amount,
                currency,
                intent.intent_id,
                Utc::now(),
            )
        };
        self.store.insert_order(&order).await?;
        Ok(order)
    }

    /// Verifies a gateway callback and settles its order exactly once.
    ///
    /// A replayed callback for an already-applied payment returns
    /// `AlreadyProcessed` without touching inventory. A valid payment that
    /// can no longer be honoured returns `ReconciliationRequired`.
    #[tracing::instrument(skip(self, signature))]
    pub async fn verify_and_commit(
        &self,
        principal: &Principal,
        intent_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<PaymentVerification, SettlementError> {
        principal.authorize(Capability::SubmitPaymentCallback)?;
        let started = Instant::now();

        let result = self.settle(intent_id, payment_id, signature).await;

        let outcome = match &result {
            Ok(PaymentVerification::Verified(_)) => "verified",
            Ok(PaymentVerification::AlreadyProcessed(_)) => "already_processed",
            Err(SettlementError::SignatureInvalid { .. }) => "invalid_signature",
            Err(SettlementError::ReconciliationRequired { .. }) => "reconciliation_required",
            Err(e) if e.kind() == domain::ErrorKind::StateConflict => "conflict",
            Err(_) => "error",
        };
        metrics::counter!("settlements_total", "outcome" => outcome).increment(1);
        metrics::histogram!("settlement_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    async fn settle(
        &self,
        intent_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<PaymentVerification, SettlementError> {
        if !self.verifier.verify(intent_id, payment_id, signature) {
            tracing::warn!(
                target: "audit",
                intent_id,
                payment_id,
                "payment callback rejected: invalid signature"
            );
            return Err(SettlementError::SignatureInvalid {
                intent_id: intent_id.to_string(),
            });
        }

        let capture = PaymentCapture::new(payment_id, signature);
        match self.store.settle(intent_id, &capture, Utc::now()).await? {
            Settlement::Committed(order) => {
                tracing::info!(
                    order_id = %order.id,
                    payment_id,
                    quantity = %order.quantity,
                    "order settled"
                );
                Ok(PaymentVerification::Verified(order))
            }
            Settlement::Replayed(order) if order.status == OrderStatus::Completed => {
                if order.intent_id() != intent_id {
                    tracing::warn!(
                        target: "audit",
                        order_id = %order.id,
                        settled_intent_id = order.intent_id(),
                        intent_id,
                        payment_id,
                        "payment id already settled another intent"
                    );
                    metrics::counter!("payment_id_reuse_total").increment(1);
                } else {
                    tracing::debug!(order_id = %order.id, payment_id, "duplicate payment callback");
                }
                Ok(PaymentVerification::AlreadyProcessed(order))
            }
            Settlement::Rejected(order) | Settlement::Replayed(order) => {
                tracing::warn!(
                    target: "audit",
                    order_id = %order.id,
                    intent_id,
                    payment_id,
                    reason = order.reconciliation.map(|r| r.as_str()).unwrap_or("unknown"),
                    "verified payment requires manual reconciliation"
                );
                Err(SettlementError::ReconciliationRequired {
                    order: Box::new(order),
                })
            }
        }
    }

    /// Cancels pending orders whose callback has not arrived within `ttl`.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale_orders(&self, ttl: Duration) -> Result<Vec<Order>, SettlementError> {
        let now = Utc::now();
        let Some(cutoff) = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return Ok(Vec::new());
        };

        let expired = self.store.cancel_stale_orders(cutoff, now).await?;
        if !expired.is_empty() {
            metrics::counter!("orders_expired_total").increment(expired.len() as u64);
            for order in &expired {
                tracing::info!(
                    order_id = %order.id,
                    intent_id = %order.intent_id(),
                    "pending order expired"
                );
            }
        }
        Ok(expired)
    }

    /// Returns one of the caller's own orders.
    pub async fn get_order(
        &self,
        principal: &Principal,
        order_id: OrderId,
    ) -> Result<Order, SettlementError> {
        principal.authorize(Capability::ViewOwnOrders)?;

        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("order", order_id))?;
        if order.buyer_id != principal.id {
            return Err(SettlementError::NotOwner {
                order_id: order_id.to_string(),
            });
        }
        Ok(order)
    }

    /// The caller's orders, oldest first.
    pub async fn list_orders_for_buyer(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Order>, SettlementError> {
        principal.authorize(Capability::ViewOwnOrders)?;
        Ok(self.store.list_orders_for_buyer(principal.id).await?)
    }
}
