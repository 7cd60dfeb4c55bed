//! Payment gateway seam.
//!
//! The marketplace never moves money itself. It asks the gateway to open a
//! payment intent for a computed amount and later receives a signed callback
//! naming the intent and the gateway's payment id.

mod http;
mod memory;

pub use http::{HttpGatewayConfig, HttpPaymentGateway};
pub use memory::{InMemoryPaymentGateway, PaymentCallback};

use std::time::Duration;

use async_trait::async_trait;
use domain::{Currency, ErrorKind, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the marketplace asks the gateway to collect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    pub amount: Money,
    pub currency: Currency,
    /// Our reference for the intent, echoed back by the gateway.
    pub receipt: String,
}

/// A payment intent opened with the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub amount: Money,
    pub currency: Currency,
}

/// Errors reported by a payment gateway. All of them are transient from the
/// caller's point of view.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Could not initialize gateway client: {0}")]
    Initialization(String),

    #[error("Payment gateway unreachable: {0}")]
    Unavailable(String),

    #[error("Payment gateway did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Payment gateway rejected the request. Error {status}. {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid payment gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::GatewayUnavailable
    }
}

/// Opens payment intents with an external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates an intent to collect `request.amount`.
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, GatewayError>;
}
