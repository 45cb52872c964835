//! Read-through cached order queries.

use cache::{CacheOptions, CacheService, CacheStore, keys};
use common::{OrderId, UserId};
use domain::Order;
use store::CommerceStore;

use crate::error::CheckoutError;

/// Cached read side for orders.
///
/// Reads go through the cache-aside service with short TTLs; placement
/// and verification invalidate the keys they touch, so a hit is at worst
/// one TTL stale for writes that bypassed this process.
pub struct OrderReader<S, C: CacheStore> {
    store: S,
    cache: CacheService<C>,
}

impl<S, C> OrderReader<S, C>
where
    S: CommerceStore,
    C: CacheStore + Clone,
{
    /// Creates a new reader.
    pub fn new(store: S, cache: CacheService<C>) -> Self {
        Self { store, cache }
    }

    /// Loads one order with its lines.
    pub async fn order(&self, order_id: OrderId) -> Result<Option<Order>, CheckoutError> {
        self.cache
            .get_or_set(
                &order_id.to_string(),
                CacheOptions::prefixed(keys::PREFIX_ORDER, keys::TTL_SHORT),
                || async { self.store.order_with_lines(order_id).await },
            )
            .await
            .map_err(CheckoutError::from)
    }

    /// Loads every order for a user, newest first.
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, CheckoutError> {
        self.cache
            .get_or_set(
                &keys::by_user(&user_id.to_string()),
                CacheOptions::prefixed(keys::PREFIX_ORDERS, keys::TTL_SHORT),
                || async { self.store.orders_for_user(user_id).await },
            )
            .await
            .map_err(CheckoutError::from)
    }
}
