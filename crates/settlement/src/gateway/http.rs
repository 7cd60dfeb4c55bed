use std::time::Duration;

use async_trait::async_trait;
use common::Secret;
use domain::{Currency, Money};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GatewayError, IntentRequest, PaymentGateway, PaymentIntent};

/// Connection settings for a Razorpay-style orders API.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Base URL without a trailing slash, e.g. `https://api.razorpay.com`.
    pub base_url: String,
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    payment_capture: u8,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

/// Opens intents with `POST {base_url}/v1/orders` using basic auth.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    config: HttpGatewayConfig,
    client: Client,
}

impl HttpPaymentGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Initialization(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self), fields(receipt = %request.receipt))]
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, GatewayError> {
        let body = CreateOrderBody {
            amount: request.amount.minor_units(),
            currency: request.currency.code(),
            receipt: &request.receipt,
            payment_capture: 1,
        };

        let response = self
            .client
            .post(self.url("/v1/orders"))
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.reveal()))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.config.timeout)
                } else {
                    GatewayError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
            tracing::warn!(status, "payment gateway rejected intent");
            return Err(GatewayError::Rejected { status, message });
        }

        let created = response
            .json::<CreateOrderResponse>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let currency = created
            .currency
            .parse::<Currency>()
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        tracing::debug!(intent_id = %created.id, "payment intent created");
        Ok(PaymentIntent {
            intent_id: created.id,
            amount: Money::from_minor_units(created.amount),
            currency,
        })
    }
}
