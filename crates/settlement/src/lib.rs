//! Order & settlement service.
//!
//! Opens payment intents with a [`PaymentGateway`], authenticates the
//! gateway's callbacks with [`SignatureVerifier`] and settles each payment
//! exactly once through [`SettlementService`].

pub mod error;
pub mod gateway;
pub mod service;
pub mod signature;

pub use error::SettlementError;
pub use gateway::{
    GatewayError, HttpGatewayConfig, HttpPaymentGateway, InMemoryPaymentGateway, IntentRequest,
    PaymentCallback, PaymentGateway, PaymentIntent,
};
pub use service::{OrderRequest, PaymentVerification, SettlementConfig, SettlementService};
pub use signature::{InvalidSecret, SignatureVerifier};
