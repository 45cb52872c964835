//! Catalog products as the inventory ledger sees them.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A catalog product. The saga treats `quantity` as a ledger: it is only
/// ever mutated through an atomic decrement inside the placement
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    /// Units in stock.
    pub quantity: i64,
}

impl Product {
    /// Returns true if `requested` units can currently be fulfilled.
    pub fn has_stock_for(&self, requested: u32) -> bool {
        self.quantity >= requested as i64
    }
}
