//! Shared types for the checkout system.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{CartId, OrderId, PaymentId, ProductId, UserId};
