//! Carts and cart lines.

use common::{CartId, Money, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// A line in a user's cart.
///
/// `unit_price` is a snapshot taken when the product was added; the
/// placement saga validates quantities against live stock but freezes
/// prices from this snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A user's active cart. Each user has at most one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
}

impl Cart {
    /// Returns true if the cart holds no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
