//! Key namespacing conventions and TTL presets.
//!
//! Cache keys are namespaced by prefix to avoid cross-resource collisions.
//! Writers invalidate (never update in place) the keys they touch.

use std::time::Duration;

/// 5 minutes.
pub const TTL_SHORT: Duration = Duration::from_secs(300);
/// 30 minutes.
pub const TTL_MEDIUM: Duration = Duration::from_secs(1800);
/// 1 hour.
pub const TTL_LONG: Duration = Duration::from_secs(3600);
/// 24 hours.
pub const TTL_VERY_LONG: Duration = Duration::from_secs(86_400);
/// 1 week. Used for refresh tokens and idempotency records.
pub const TTL_WEEK: Duration = Duration::from_secs(604_800);

/// Prefix for single-product cache entries.
pub const PREFIX_PRODUCT: &str = "product";
/// Prefix for product listing cache entries.
pub const PREFIX_PRODUCTS: &str = "products";
/// Prefix for cart cache entries.
pub const PREFIX_CART: &str = "cart";
/// Prefix for single-order cache entries.
pub const PREFIX_ORDER: &str = "order";
/// Prefix for order listing cache entries.
pub const PREFIX_ORDERS: &str = "orders";

/// Key for a stored refresh token record.
pub fn refresh_token(token: &str) -> String {
    format!("refreshToken:{token}")
}

/// Key for an idempotency record or claim.
pub fn idempotency(token: &str) -> String {
    format!("idempotency:{token}")
}

/// Sub-key for per-user listings, combined with a listing prefix.
pub fn by_user(user_id: &str) -> String {
    format!("user:{user_id}")
}
