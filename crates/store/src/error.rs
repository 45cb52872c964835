//! Store error types.

use thiserror::Error;

/// Errors that can occur against the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database returned an error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An insert hit the `order_number` uniqueness constraint. Callers
    /// regenerate the number and retry rather than failing the saga.
    #[error("Order number already taken")]
    OrderNumberTaken,

    /// Stored data did not round-trip through the domain types.
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
}

impl From<domain::DomainError> for StoreError {
    fn from(err: domain::DomainError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}
