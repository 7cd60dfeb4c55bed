use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{GatewayError, IntentRequest, PaymentGateway, PaymentIntent};
use crate::signature::SignatureVerifier;

/// A signed callback as the gateway would deliver it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub intent_id: String,
    pub payment_id: String,
    pub signature: String,
}

/// Sandbox gateway for tests and local runs.
///
/// Intents get sequential ids (`order_0001`, ...). Failure and latency can be
/// switched on to exercise the service's timeout and error paths, and
/// [`InMemoryPaymentGateway::capture`] produces callbacks signed with the
/// same webhook secret the service verifies against.
#[derive(Clone)]
pub struct InMemoryPaymentGateway {
    signer: SignatureVerifier,
    intents: Arc<RwLock<HashMap<String, PaymentIntent>>>,
    next_intent: Arc<AtomicU32>,
    next_payment: Arc<AtomicU32>,
    fail: Arc<AtomicBool>,
    delay_ms: Arc<AtomicU64>,
}

impl InMemoryPaymentGateway {
    pub fn new(signer: SignatureVerifier) -> Self {
        Self {
            signer,
            intents: Arc::new(RwLock::new(HashMap::new())),
            next_intent: Arc::new(AtomicU32::new(1)),
            next_payment: Arc::new(AtomicU32::new(1)),
            fail: Arc::new(AtomicBool::new(false)),
            delay_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Makes every subsequent intent request fail as unreachable.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Delays every subsequent intent request.
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    pub async fn intent_count(&self) -> usize {
        self.intents.read().await.len()
    }

    pub async fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.intents.read().await.get(intent_id).cloned()
    }

    /// Simulates the buyer paying an intent and returns the signed callback.
    pub fn capture(&self, intent_id: &str) -> PaymentCallback {
        let n = self.next_payment.fetch_add(1, Ordering::SeqCst);
        self.callback(intent_id, &format!("pay_{n:04}"))
    }

    /// Signs a callback for an arbitrary payment id.
    pub fn callback(&self, intent_id: &str, payment_id: &str) -> PaymentCallback {
        PaymentCallback {
            intent_id: intent_id.to_string(),
            payment_id: payment_id.to_string(),
            signature: self.signer.sign(intent_id, payment_id),
        }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, GatewayError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable(
                "sandbox gateway configured to fail".to_string(),
            ));
        }

        let n = self.next_intent.fetch_add(1, Ordering::SeqCst);
        let intent = PaymentIntent {
            intent_id: format!("order_{n:04}"),
            amount: request.amount,
            currency: request.currency,
        };
        self.intents
            .write()
            .await
            .insert(intent.intent_id.clone(), intent.clone());

        tracing::debug!(
            intent_id = %intent.intent_id,
            receipt = %request.receipt,
            amount = %intent.amount,
            "sandbox intent created"
        );
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use domain::{Currency, Money};

    fn gateway() -> InMemoryPaymentGateway {
        let signer = SignatureVerifier::new(&Secret::new("whsec_test".to_string())).unwrap();
        InMemoryPaymentGateway::new(signer)
    }

    fn request() -> IntentRequest {
        IntentRequest {
            amount: Money::from_minor_units(3000),
            currency: Currency::Inr,
            receipt: "rcpt".to_string(),
        }
    }

    #[tokio::test]
    async fn issues_sequential_intent_ids() {
        let gateway = gateway();
        let first = gateway.create_intent(request()).await.unwrap();
        let second = gateway.create_intent(request()).await.unwrap();

        assert_eq!(first.intent_id, "order_0001");
        assert_eq!(second.intent_id, "order_0002");
        assert_eq!(first.amount, Money::from_minor_units(3000));
        assert_eq!(gateway.intent_count().await, 2);
    }

    #[tokio::test]
    async fn fail_flag_rejects_requests() {
        let gateway = gateway();
        gateway.set_fail(true);

        let err = gateway.create_intent(request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert_eq!(gateway.intent_count().await, 0);
    }

    #[test]
    fn captured_callbacks_verify() {
        let signer = SignatureVerifier::new(&Secret::new("whsec_test".to_string())).unwrap();
        let gateway = InMemoryPaymentGateway::new(signer.clone());

        let callback = gateway.capture("order_0001");
        assert_eq!(callback.payment_id, "pay_0001");
        assert!(signer.verify(
            &callback.intent_id,
            &callback.payment_id,
            &callback.signature
        ));
    }
}
