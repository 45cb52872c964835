//! Checkout: the order placement saga and its collaborators.
//!
//! [`OrderOrchestrator`] coordinates one placement across the relational
//! store, the payment gateway and the cache, all inside a single store
//! transaction. [`PaymentGateway`] is the seam to the payment provider,
//! with a [`PaystackGateway`] production adapter and an
//! [`InMemoryPaymentGateway`] for tests. [`OrderReader`] serves the
//! cached read paths.

pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod paystack;
pub mod reader;

pub use error::CheckoutError;
pub use gateway::{
    GatewayError, InMemoryPaymentGateway, InitiatePayment, PaymentGateway, PaymentInitiation,
    PaymentMetadata, PaymentVerification,
};
pub use orchestrator::{OrderOrchestrator, PlacedOrder, VerificationReceipt};
pub use paystack::PaystackGateway;
pub use reader::OrderReader;
