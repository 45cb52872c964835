//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the payment gateway boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The HTTP call itself failed.
    #[error("Payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered but reported the transaction as failed.
    #[error("Payment gateway declined: {0}")]
    Declined(String),

    /// The gateway answered with a body the adapter cannot use.
    #[error("Payment gateway response is malformed: {0}")]
    Malformed(String),
}

/// Correlation metadata attached to every initiated transaction. The
/// order id travels to the gateway and back so verification can find the
/// order without trusting the caller-supplied reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMetadata {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
}

/// A request to start a gateway transaction.
#[derive(Debug, Clone)]
pub struct InitiatePayment {
    /// Amount in minor units, as the gateway wire format requires.
    pub amount: String,
    pub email: String,
    pub reference: String,
    pub callback_url: String,
    pub metadata: PaymentMetadata,
}

/// A successfully initiated transaction.
#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    /// URL the customer is redirected to for payment.
    pub authorization_url: String,
    /// The gateway-confirmed reference for this transaction.
    pub reference: String,
    pub message: String,
    pub status: bool,
}

/// The gateway's verdict on a completed transaction.
#[derive(Debug, Clone)]
pub struct PaymentVerification {
    /// True if the gateway reports the transaction as successful.
    pub status: bool,
    /// Amount charged, in minor units.
    pub amount_minor: i64,
    pub reference: String,
    /// Order id recovered from the transaction metadata.
    pub order_id: OrderId,
}

/// Trait for payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a transaction and returns the customer-facing payment URL.
    async fn initiate(&self, request: InitiatePayment) -> Result<PaymentInitiation, GatewayError>;

    /// Asks the gateway whether the referenced transaction succeeded.
    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError>;
}

#[async_trait]
impl<G: PaymentGateway + ?Sized> PaymentGateway for Arc<G> {
    async fn initiate(&self, request: InitiatePayment) -> Result<PaymentInitiation, GatewayError> {
        (**self).initiate(request).await
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError> {
        (**self).verify(reference).await
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    /// Initiated transactions by reference.
    transactions: HashMap<String, (PaymentMetadata, i64)>,
    fail_on_initiate: bool,
    verify_status: bool,
}

/// In-memory payment gateway for testing.
///
/// Records every initiated transaction and answers `verify` from that
/// record, so tests exercise the same metadata round trip the real
/// gateway performs.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryGatewayState {
                transactions: HashMap::new(),
                fail_on_initiate: false,
                verify_status: true,
            })),
        }
    }
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail initiate calls.
    pub fn set_fail_on_initiate(&self, fail: bool) {
        self.state.write().unwrap().fail_on_initiate = fail;
    }

    /// Configures the verdict `verify` reports for known references.
    pub fn set_verify_status(&self, status: bool) {
        self.state.write().unwrap().verify_status = status;
    }

    /// Returns the number of initiated transactions.
    pub fn transaction_count(&self) -> usize {
        self.state.read().unwrap().transactions.len()
    }

    /// Returns the minor-unit amount recorded for a reference.
    pub fn amount_for(&self, reference: &str) -> Option<i64> {
        self.state
            .read()
            .unwrap()
            .transactions
            .get(reference)
            .map(|(_, amount)| *amount)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn initiate(&self, request: InitiatePayment) -> Result<PaymentInitiation, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_initiate {
            return Err(GatewayError::Declined(
                "Transaction could not be initiated".to_string(),
            ));
        }

        let amount: i64 = request
            .amount
            .parse()
            .map_err(|_| GatewayError::Malformed(format!("bad amount: {}", request.amount)))?;
        state
            .transactions
            .insert(request.reference.clone(), (request.metadata, amount));

        Ok(PaymentInitiation {
            authorization_url: format!("https://pay.test/authorize/{}", request.reference),
            reference: request.reference,
            message: "Authorization URL created".to_string(),
            status: true,
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentVerification, GatewayError> {
        let state = self.state.read().unwrap();

        let (metadata, amount) = state
            .transactions
            .get(reference)
            .ok_or_else(|| GatewayError::Malformed(format!("unknown reference: {reference}")))?;

        Ok(PaymentVerification {
            status: state.verify_status,
            amount_minor: *amount,
            reference: reference.to_string(),
            order_id: metadata.order_id,
        })
    }
}
