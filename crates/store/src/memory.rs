//! In-memory store implementation for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{CartId, OrderId, PaymentId, ProductId, UserId};
use domain::{Cart, CartLine, Order, OrderLine, OrderStatus, Payment, Product};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::{CommerceStore, StoreTx};
use crate::{Result, StoreError};

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
}

/// In-memory commerce store for testing.
///
/// Transactions stage their writes against a copy of the state and swap
/// it in on commit; dropping an uncommitted transaction discards the
/// staged copy. The state mutex is held for the lifetime of a
/// transaction, which gives serializable isolation — stricter than
/// Postgres, but on the safe side of every invariant the saga needs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    fail_on_decrement: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next stock decrement report zero rows affected,
    /// simulating a concurrent depletion at commit time.
    pub fn set_fail_on_decrement(&self, fail: bool) {
        self.fail_on_decrement.store(fail, Ordering::SeqCst);
    }

    /// Seeds a product.
    pub async fn insert_product(&self, product: Product) {
        let mut state = self.state.lock().await;
        state.products.insert(product.id, product);
    }

    /// Seeds (or replaces) the user's cart with the given lines.
    pub async fn set_cart(&self, user_id: UserId, lines: Vec<CartLine>) -> CartId {
        let mut state = self.state.lock().await;
        let existing = state.carts.values().find(|c| c.user_id == user_id);
        let cart_id = existing.map(|c| c.id).unwrap_or_default();
        state.carts.insert(
            cart_id,
            Cart {
                id: cart_id,
                user_id,
                lines,
            },
        );
        cart_id
    }

    /// Returns the current stock quantity for a product.
    pub async fn product_quantity(&self, product_id: ProductId) -> Option<i64> {
        let state = self.state.lock().await;
        state.products.get(&product_id).map(|p| p.quantity)
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns the number of lines in the user's cart.
    pub async fn cart_len(&self, user_id: UserId) -> usize {
        let state = self.state.lock().await;
        state
            .carts
            .values()
            .find(|c| c.user_id == user_id)
            .map_or(0, |c| c.lines.len())
    }

    /// Returns the number of stored payments.
    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            staged,
            fail_on_decrement: self.fail_on_decrement.clone(),
        }))
    }

    async fn order_with_lines(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.reference == reference)
            .cloned())
    }

    async fn product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let state = self.state.lock().await;
        Ok(state.products.get(&product_id).cloned())
    }
}

/// An in-memory transaction: staged writes over a held state lock.
pub struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    staged: State,
    fail_on_decrement: Arc<AtomicBool>,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn cart_for_user(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self
            .staged
            .carts
            .values()
            .find(|c| c.user_id == user_id)
            .cloned())
    }

    async fn pending_order_exists(&mut self, user_id: UserId) -> Result<bool> {
        Ok(self
            .staged
            .orders
            .values()
            .any(|o| o.user_id == user_id && o.status == OrderStatus::Pending))
    }

    async fn product_stock(&mut self, product_id: ProductId) -> Result<Option<i64>> {
        Ok(self.staged.products.get(&product_id).map(|p| p.quantity))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let number_taken = self
            .staged
            .orders
            .values()
            .any(|o| o.order_number == order.order_number);
        if number_taken {
            return Err(StoreError::OrderNumberTaken);
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_order_lines(&mut self, order_id: OrderId, lines: &[OrderLine]) -> Result<()> {
        let order = self
            .staged
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::Corrupt(format!("no such order: {order_id}")))?;
        order.lines.extend_from_slice(lines);
        Ok(())
    }

    async fn upsert_payment(&mut self, payment: &Payment) -> Result<()> {
        // Mirrors the order_id-keyed upsert of the Postgres backend.
        self.staged
            .payments
            .retain(|_, p| p.order_id != payment.order_id);
        self.staged.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> Result<u64> {
        if self.fail_on_decrement.load(Ordering::SeqCst) {
            return Ok(0);
        }
        let Some(product) = self.staged.products.get_mut(&product_id) else {
            return Ok(0);
        };
        if product.quantity < quantity as i64 {
            return Ok(0);
        }
        product.quantity -= quantity as i64;
        Ok(1)
    }

    async fn clear_cart(&mut self, cart_id: CartId) -> Result<()> {
        if let Some(cart) = self.staged.carts.get_mut(&cart_id) {
            cart.lines.clear();
        }
        Ok(())
    }

    async fn order_by_id(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.staged.orders.get(&order_id).cloned())
    }

    async fn set_order_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        if let Some(order) = self.staged.orders.get_mut(&order_id) {
            order.status = status;
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        *self.guard = self.staged;
        Ok(())
    }
}
