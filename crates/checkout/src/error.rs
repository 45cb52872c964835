//! Checkout error taxonomy.

use cache::IdempotencyError;
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors surfaced by order placement, verification and reads.
///
/// Variants carry enough shape for the HTTP layer to map them to status
/// codes without string matching.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The user already has an order awaiting payment.
    #[error("A pending order already exists for this user")]
    PendingOrderExists,

    /// Stock cannot cover the requested quantity.
    #[error("Insufficient stock for {product_name}: {available} available, {requested} requested")]
    InsufficientStock {
        product_name: String,
        available: i64,
        requested: u32,
    },

    /// A referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request is well-formed but cannot be processed.
    #[error("{0}")]
    Unprocessable(String),

    /// The payment gateway failed or reported a failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The idempotency guard refused or deduplicated the call.
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    /// The relational store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A domain rule was violated.
    #[error(transparent)]
    Domain(#[from] DomainError),
}
