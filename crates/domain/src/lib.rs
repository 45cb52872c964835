//! Domain layer for the checkout system.
//!
//! Entities, value objects and the invariants the order placement saga
//! depends on: the order status state machine, frozen order-line pricing
//! and the human-facing order number format.

pub mod cart;
pub mod error;
pub mod order;
pub mod order_number;
pub mod payment;
pub mod product;

pub use cart::{Cart, CartLine};
pub use error::DomainError;
pub use order::{Order, OrderLine, OrderStatus};
pub use payment::{Payment, PaymentStatus};
pub use product::Product;
