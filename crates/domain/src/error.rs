//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors that can occur applying domain rules.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An order status transition outside the state machine was requested.
    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// A stored status string did not match any known status.
    #[error("Unknown status value: {0}")]
    UnknownStatus(String),
}
