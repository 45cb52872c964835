//! Orders and the order status state machine.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::cart::CartLine;
use crate::error::DomainError;

/// The status of an order in its lifecycle.
///
/// Transitions:
/// ```text
/// Pending ──► Placed ──► Shipped ──► Delivered
///    │
///    └──────► Cancelled
/// ```
///
/// Only `Pending -> Placed` (payment verified) and `Pending -> Cancelled`
/// are saga-driven; the later transitions are administrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Placed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the state machine allows moving to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Placed) | (Pending, Cancelled) | (Placed, Shipped) | (Shipped, Delivered)
        )
    }

    /// Validates a transition, returning the new status.
    pub fn transition_to(&self, next: OrderStatus) -> Result<OrderStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidStatusTransition {
                from: *self,
                to: next,
            })
        }
    }

    /// Returns the lowercase storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Placed => "placed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "placed" => Ok(OrderStatus::Placed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// A line on an order: a frozen copy of a cart line at order time, not a
/// live reference to the catalog price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    /// `quantity × unit price` at the moment the order was created.
    pub total_amount: Money,
}

impl OrderLine {
    /// Freezes a cart line into an order line using its snapshot price.
    pub fn freeze(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            quantity: line.quantity,
            total_amount: line.unit_price.multiply(line.quantity),
        }
    }
}

/// A placed or in-progress order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Human-facing unique order number.
    pub order_number: String,
    pub status: OrderStatus,
    /// Sum of line totals plus shipping fee, computed once at creation.
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Computes `sum(line totals) + shipping_fee`.
    pub fn total_for(lines: &[OrderLine], shipping_fee: Money) -> Money {
        lines.iter().map(|l| l.total_amount).sum::<Money>() + shipping_fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saga_transitions_are_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Placed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn administrative_transitions_are_allowed() {
        assert!(OrderStatus::Placed.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        assert!(!OrderStatus::Placed.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Placed));

        let err = OrderStatus::Placed
            .transition_to(OrderStatus::Delivered)
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidStatusTransition {
                from: OrderStatus::Placed,
                to: OrderStatus::Delivered
            }
        ));
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Placed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let parsed: OrderStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("unknown".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn freeze_copies_the_snapshot_price() {
        let line = CartLine {
            product_id: ProductId::new(),
            product_name: "Widget".to_string(),
            quantity: 3,
            unit_price: Money::from_cents(1000),
        };

        let frozen = OrderLine::freeze(&line);
        assert_eq!(frozen.total_amount, Money::from_cents(3000));
        assert_eq!(frozen.quantity, 3);
    }

    #[test]
    fn total_is_line_sum_plus_shipping() {
        let lines = vec![
            OrderLine {
                product_id: ProductId::new(),
                product_name: "A".to_string(),
                quantity: 2,
                total_amount: Money::from_cents(2000),
            },
            OrderLine {
                product_id: ProductId::new(),
                product_name: "B".to_string(),
                quantity: 1,
                total_amount: Money::from_cents(2500),
            },
        ];

        let total = Order::total_for(&lines, Money::from_major(30));
        assert_eq!(total, Money::from_cents(7500));
    }
}
