//! Orders and the settlement decision.
//!
//! [`plan_settlement`] is the pure half of `verify_and_commit`: given the
//! current order row, the verified capture and the listing's stock, it decides
//! what the atomic commit must write. The store applies the plan inside its
//! critical section.

use chrono::{DateTime, Utc};
use common::{CompostListingId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::{Currency, Money, Quantity};

/// Order lifecycle: `Pending → Completed | Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(ValidationError::UnknownVariant {
                field: "order_status",
                value: s.to_string(),
            }),
        }
    }
}

/// Why a verified payment could not be honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationReason {
    /// Stock ran out between intent creation and the callback.
    InventoryDepleted,
    /// The order had already been expired when the payment arrived.
    PaidAfterExpiry,
}

impl ReconciliationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationReason::InventoryDepleted => "inventory_depleted",
            ReconciliationReason::PaidAfterExpiry => "paid_after_expiry",
        }
    }
}

impl std::fmt::Display for ReconciliationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReconciliationReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inventory_depleted" => Ok(ReconciliationReason::InventoryDepleted),
            "paid_after_expiry" => Ok(ReconciliationReason::PaidAfterExpiry),
            _ => Err(ValidationError::UnknownVariant {
                field: "reconciliation",
                value: s.to_string(),
            }),
        }
    }
}

/// Gateway references attached to an order.
///
/// `intent_id` is known from creation; `payment_id` and `signature` are
/// filled in by the first verified callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReference {
    pub intent_id: String,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
}

impl PaymentReference {
    pub fn for_intent(intent_id: impl Into<String>) -> Self {
        Self {
            intent_id: intent_id.into(),
            payment_id: None,
            signature: None,
        }
    }
}

/// A payment callback whose signature has already been verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCapture {
    pub payment_id: String,
    pub signature: String,
}

impl PaymentCapture {
    pub fn new(payment_id: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            signature: signature.into(),
        }
    }
}

/// A buyer's purchase of compost, settled through the payment gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub compost_listing_id: CompostListingId,
    pub quantity: Quantity,
    pub total_price: Money,
    pub currency: Currency,
    pub status: OrderStatus,
    pub payment: PaymentReference,
    pub reconciliation: Option<ReconciliationReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A new order awaiting its payment callback.
    pub fn pending(
        buyer_id: UserId,
        compost_listing_id: CompostListingId,
        quantity: Quantity,
        total_price: Money,
        currency: Currency,
        intent_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            buyer_id,
            compost_listing_id,
            quantity,
            total_price,
            currency,
            status: OrderStatus::Pending,
            payment: PaymentReference::for_intent(intent_id),
            reconciliation: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn intent_id(&self) -> &str {
        &self.payment.intent_id
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payment.payment_id.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Returns true if the order is pending and was created before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_pending() && self.created_at < cutoff
    }

    /// Cancels a pending order that never received a callback.
    ///
    /// Returns `None` if the order has already left `Pending`.
    pub fn expire(&self, now: DateTime<Utc>) -> Option<Order> {
        if !self.is_pending() {
            return None;
        }
        Some(Order {
            status: OrderStatus::Cancelled,
            updated_at: now,
            ..self.clone()
        })
    }

    fn captured(&self, capture: &PaymentCapture, now: DateTime<Utc>) -> Order {
        Order {
            payment: PaymentReference {
                intent_id: self.payment.intent_id.clone(),
                payment_id: Some(capture.payment_id.clone()),
                signature: Some(capture.signature.clone()),
            },
            updated_at: now,
            ..self.clone()
        }
    }
}

/// What the settlement commit must do with an order.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementPlan {
    /// Write the completed order and set the listing's stock to `remaining`.
    Commit { order: Order, remaining: Quantity },
    /// Write the cancelled, reconciliation-flagged order. Stock is untouched.
    Reject { order: Order },
    /// The callback was already applied; write nothing.
    Replay { order: Order },
    /// The order was settled by a different payment; write nothing.
    Conflict { order: Order },
}

/// Decides how a verified capture settles `order` given the stock on hand.
pub fn plan_settlement(
    order: &Order,
    capture: &PaymentCapture,
    available: Quantity,
    now: DateTime<Utc>,
) -> SettlementPlan {
    let same_payment = order.payment_id() == Some(capture.payment_id.as_str());
    match order.status {
        OrderStatus::Completed | OrderStatus::Cancelled if same_payment => SettlementPlan::Replay {
            order: order.clone(),
        },
        OrderStatus::Completed => SettlementPlan::Conflict {
            order: order.clone(),
        },
        OrderStatus::Cancelled if order.payment_id().is_none() => {
            let mut rejected = order.captured(capture, now);
            rejected.reconciliation = Some(ReconciliationReason::PaidAfterExpiry);
            SettlementPlan::Reject { order: rejected }
        }
        OrderStatus::Cancelled => SettlementPlan::Conflict {
            order: order.clone(),
        },
        OrderStatus::Pending => match available.checked_sub(order.quantity) {
            Some(remaining) => {
                let mut completed = order.captured(capture, now);
                completed.status = OrderStatus::Completed;
                SettlementPlan::Commit {
                    order: completed,
                    remaining,
                }
            }
            None => {
                let mut rejected = order.captured(capture, now);
                rejected.status = OrderStatus::Cancelled;
                rejected.reconciliation = Some(ReconciliationReason::InventoryDepleted);
                SettlementPlan::Reject { order: rejected }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn kg(value: f64) -> Quantity {
        Quantity::from_kg(value).unwrap()
    }

    fn pending_order(quantity: Quantity) -> Order {
        Order::pending(
            UserId::new(),
            CompostListingId::new(),
            quantity,
            Money::from_minor_units(3000),
            Currency::Inr,
            "order_0001",
            Utc::now(),
        )
    }

    fn capture(payment_id: &str) -> PaymentCapture {
        PaymentCapture::new(payment_id, "deadbeef")
    }

    #[test]
    fn pending_order_with_stock_commits() {
        let order = pending_order(kg(3.0));
        match plan_settlement(&order, &capture("pay_1"), kg(5.0), Utc::now()) {
            SettlementPlan::Commit { order, remaining } => {
                assert_eq!(order.status, OrderStatus::Completed);
                assert_eq!(order.payment_id(), Some("pay_1"));
                assert_eq!(order.payment.signature.as_deref(), Some("deadbeef"));
                assert_eq!(remaining, kg(2.0));
            }
            other => panic!("expected commit, got {other:?}"),
        }
    }

    #[test]
    fn exact_stock_commits_to_zero() {
        let order = pending_order(kg(1.0));
        match plan_settlement(&order, &capture("pay_1"), kg(1.0), Utc::now()) {
            SettlementPlan::Commit { remaining, .. } => assert_eq!(remaining, Quantity::zero()),
            other => panic!("expected commit, got {other:?}"),
        }
    }

    #[test]
    fn depleted_stock_cancels_with_reconciliation_flag() {
        let order = pending_order(kg(1.0));
        match plan_settlement(&order, &capture("pay_1"), kg(0.5), Utc::now()) {
            SettlementPlan::Reject { order } => {
                assert_eq!(order.status, OrderStatus::Cancelled);
                assert_eq!(
                    order.reconciliation,
                    Some(ReconciliationReason::InventoryDepleted)
                );
                assert_eq!(order.payment_id(), Some("pay_1"));
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn same_payment_replays() {
        let order = pending_order(kg(1.0));
        let SettlementPlan::Commit { order: completed, .. } =
            plan_settlement(&order, &capture("pay_1"), kg(1.0), Utc::now())
        else {
            panic!("expected commit");
        };
        // stock is gone now; the replay must not be judged against it
        let replay = plan_settlement(&completed, &capture("pay_1"), Quantity::zero(), Utc::now());
        assert_eq!(replay, SettlementPlan::Replay { order: completed });
    }

    #[test]
    fn replay_of_depleted_callback_is_stable() {
        let order = pending_order(kg(1.0));
        let SettlementPlan::Reject { order: rejected } =
            plan_settlement(&order, &capture("pay_1"), Quantity::zero(), Utc::now())
        else {
            panic!("expected reject");
        };
        let replay = plan_settlement(&rejected, &capture("pay_1"), kg(10.0), Utc::now());
        assert_eq!(replay, SettlementPlan::Replay { order: rejected });
    }

    #[test]
    fn different_payment_for_completed_order_conflicts() {
        let order = pending_order(kg(1.0));
        let SettlementPlan::Commit { order: completed, .. } =
            plan_settlement(&order, &capture("pay_1"), kg(1.0), Utc::now())
        else {
            panic!("expected commit");
        };
        assert!(matches!(
            plan_settlement(&completed, &capture("pay_2"), kg(1.0), Utc::now()),
            SettlementPlan::Conflict { .. }
        ));
    }

    #[test]
    fn payment_after_expiry_is_flagged_without_touching_stock() {
        let order = pending_order(kg(1.0));
        let expired = order.expire(Utc::now()).unwrap();
        match plan_settlement(&expired, &capture("pay_1"), kg(10.0), Utc::now()) {
            SettlementPlan::Reject { order } => {
                assert_eq!(order.status, OrderStatus::Cancelled);
                assert_eq!(
                    order.reconciliation,
                    Some(ReconciliationReason::PaidAfterExpiry)
                );
                assert_eq!(order.payment_id(), Some("pay_1"));
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn expire_only_applies_to_pending_orders() {
        let order = pending_order(kg(1.0));
        let cutoff = order.created_at + Duration::seconds(1);
        assert!(order.is_stale(cutoff));
        assert!(!order.is_stale(order.created_at));

        let expired = order.expire(Utc::now()).unwrap();
        assert_eq!(expired.status, OrderStatus::Cancelled);
        assert!(expired.reconciliation.is_none());
        assert!(expired.expire(Utc::now()).is_none());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            "paid_after_expiry".parse::<ReconciliationReason>().unwrap(),
            ReconciliationReason::PaidAfterExpiry
        );
    }
}
