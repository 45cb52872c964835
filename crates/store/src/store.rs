//! The transactional store contract the placement saga runs over.

use async_trait::async_trait;
use common::{CartId, OrderId, ProductId, UserId};
use domain::{Cart, Order, OrderLine, OrderStatus, Payment, Product};

use crate::Result;

/// Relational persistence for carts, orders, products and payments.
///
/// `begin` opens the single atomic transaction boundary the order
/// placement saga requires; the pool-level reads serve request paths that
/// need no transaction.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Opens a unit of work. Dropping the returned transaction without
    /// committing rolls back every write made through it.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Loads an order with its lines.
    async fn order_with_lines(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads every order for a user, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Looks up a payment by its gateway reference.
    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>>;

    /// Loads a product.
    async fn product(&self, product_id: ProductId) -> Result<Option<Product>>;
}

#[async_trait]
impl<S: CommerceStore + ?Sized> CommerceStore for std::sync::Arc<S> {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        (**self).begin().await
    }

    async fn order_with_lines(&self, order_id: OrderId) -> Result<Option<Order>> {
        (**self).order_with_lines(order_id).await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        (**self).orders_for_user(user_id).await
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        (**self).payment_by_reference(reference).await
    }

    async fn product(&self, product_id: ProductId) -> Result<Option<Product>> {
        (**self).product(product_id).await
    }
}

/// A single unit of work. All writes commit together or not at all.
#[async_trait]
pub trait StoreTx: Send {
    /// Loads the user's cart with its lines, locking the cart row for the
    /// remainder of the transaction. The lock serializes the
    /// check-then-create window so two concurrent placements for the same
    /// user cannot both pass the pending-order check.
    async fn cart_for_user(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Returns true if the user already has an order in `pending` status.
    async fn pending_order_exists(&mut self, user_id: UserId) -> Result<bool>;

    /// Reads the latest committed stock quantity for a product.
    async fn product_stock(&mut self, product_id: ProductId) -> Result<Option<i64>>;

    /// Inserts an order header. A uniqueness violation on the order number
    /// maps to [`StoreError::OrderNumberTaken`](crate::StoreError) and
    /// leaves the transaction usable so the caller can retry with a fresh
    /// number.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Inserts the order's lines.
    async fn insert_order_lines(&mut self, order_id: OrderId, lines: &[OrderLine]) -> Result<()>;

    /// Inserts or replaces the payment record for an order.
    async fn upsert_payment(&mut self, payment: &Payment) -> Result<()>;

    /// Atomically decrements stock: `quantity -= n` guarded by
    /// `quantity >= n`. Returns the number of rows affected; zero means
    /// stock changed concurrently or was already insufficient, and the
    /// caller must abort the whole transaction.
    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<u64>;

    /// Deletes all lines from a cart.
    async fn clear_cart(&mut self, cart_id: CartId) -> Result<()>;

    /// Loads an order with its lines inside the transaction, locking the
    /// order row until commit so concurrent status transitions serialize.
    async fn order_by_id(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Updates an order's status.
    async fn set_order_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<()>;

    /// Commits the unit of work.
    async fn commit(self: Box<Self>) -> Result<()>;
}
