//! Paystack payment gateway adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gateway::{
    GatewayError, InitiatePayment, PaymentGateway, PaymentInitiation, PaymentMetadata,
    PaymentVerification,
};

const DEFAULT_BASE_URL: &str = "https://api.paystack.co";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway adapter for the Paystack transaction API.
///
/// Authenticates with a bearer secret key. Amounts on the wire are minor
/// units; the initialize endpoint takes them as a string, verify returns
/// them as an integer.
#[derive(Clone)]
pub struct PaystackGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl PaystackGateway {
    /// Creates a gateway against the public Paystack API.
    pub fn new(secret_key: impl Into<String>) -> Result<Self, GatewayError> {
        Self::with_base_url(secret_key, DEFAULT_BASE_URL)
    }

    /// Creates a gateway against a custom base URL. Used by tests pointed
    /// at a local stub server.
    pub fn with_base_url(
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }
}

#[derive(Serialize)]
struct InitializeRequest<'a> {
    amount: &'a str,
    email: &'a str,
    reference: &'a str,
    callback_url: &'a str,
    metadata: &'a PaymentMetadata,
}

#[derive(Deserialize)]
struct InitializeResponse {
    status: bool,
    message: String,
    data: Option<InitializeData>,
}

#[derive(Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Deserialize)]
struct VerifyResponse {
    status: bool,
    message: String,
    data: Option<VerifyData>,
}

#[derive(Deserialize)]
struct VerifyData {
    amount: i64,
    reference: String,
    metadata: PaymentMetadata,
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    #[tracing::instrument(skip(self, request), fields(reference = %request.reference))]
    async fn initiate(&self, request: InitiatePayment) -> Result<PaymentInitiation, GatewayError> {
        let body = InitializeRequest {
            amount: &request.amount,
            email: &request.email,
            reference: &request.reference,
            callback_url: &request.callback_url,
            metadata: &request.metadata,
        };

        let response: InitializeResponse = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.status {
            return Err(GatewayError::Declined(response.message));
        }
        let data = response
            .data
            .ok_or_else(|| GatewayError::Malformed("initialize response has no data".to_string()))?;

        Ok(PaymentInitiation {
            authorization_url: data.authorization_url,
            reference: data.reference,
            message: response.message,
            status: response.status,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError> {
        let response: VerifyResponse = self
            .client
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.status {
            return Err(GatewayError::Declined(response.message));
        }
        let data = response
            .data
            .ok_or_else(|| GatewayError::Malformed("verify response has no data".to_string()))?;

        Ok(PaymentVerification {
            status: response.status,
            amount_minor: data.amount,
            reference: data.reference,
            order_id: data.metadata.order_id,
        })
    }
}
