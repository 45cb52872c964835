//! Cache infrastructure for the checkout system.
//!
//! The [`CacheStore`] trait is the leaf dependency everything above it
//! builds on: a key-value store with per-key expiration, an atomic
//! set-if-absent claim, and pattern-based bulk deletion. Two backends are
//! provided: [`RedisCacheStore`] for production and [`InMemoryCacheStore`]
//! for tests.
//!
//! Layered on top:
//! - [`CacheService`] — typed cache-aside reads (`get_or_set`) with
//!   degrade-to-miss semantics; the cache is never a source of truth here.
//! - [`IdempotencyGuard`] — at-most-one-execution for side-effecting
//!   operations keyed by a client token; fails closed when the store is
//!   unreachable.
//! - [`RefreshTokenStore`] — session continuity records sharing the same
//!   TTL and invalidation contract.

pub mod error;
pub mod idempotency;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod service;
pub mod session;
pub mod store;

pub use error::CacheError;
pub use idempotency::{IdempotencyError, IdempotencyGuard};
pub use memory::InMemoryCacheStore;
pub use redis_store::RedisCacheStore;
pub use service::{CacheOptions, CacheService};
pub use session::{RefreshTokenRecord, RefreshTokenStore, SessionError};
pub use store::CacheStore;

/// Convenience type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;
