use domain::{
    AuthorizationError, ErrorKind, InsufficientInventory, Order, ReconciliationReason,
    ValidationError,
};
use store::StoreError;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors from order creation and payment settlement.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The callback signature does not authenticate the intent/payment pair.
    /// The order is left untouched.
    #[error("Invalid payment signature for intent {intent_id}")]
    SignatureInvalid { intent_id: String },

    /// A verified payment could not be honoured. The order is cancelled and
    /// flagged; the refund is a manual step.
    #[error("Order {} was paid but requires manual reconciliation", .order.id)]
    ReconciliationRequired { order: Box<Order> },

    #[error("Insufficient inventory: {0}")]
    Insufficient(#[from] InsufficientInventory),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Order {order_id} belongs to another buyer")]
    NotOwner { order_id: String },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Forbidden(#[from] AuthorizationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::SignatureInvalid { .. } => ErrorKind::SignatureInvalid,
            SettlementError::ReconciliationRequired { .. } => ErrorKind::StateConflict,
            SettlementError::Insufficient(e) => e.kind(),
            SettlementError::NotFound { .. } => ErrorKind::NotFound,
            SettlementError::NotOwner { .. } => ErrorKind::Forbidden,
            SettlementError::Gateway(e) => e.kind(),
            SettlementError::Validation(e) => e.kind(),
            SettlementError::Forbidden(e) => e.kind(),
            SettlementError::Store(e) => e.kind(),
        }
    }

    /// The flagged order carried by a `ReconciliationRequired` error.
    pub fn reconciliation_order(&self) -> Option<&Order> {
        match self {
            SettlementError::ReconciliationRequired { order } => Some(order),
            _ => None,
        }
    }

    pub fn reconciliation_reason(&self) -> Option<ReconciliationReason> {
        self.reconciliation_order().and_then(|o| o.reconciliation)
    }

    pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        SettlementError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
