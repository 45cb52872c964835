//! The cache store contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// A key-value store with per-key expiration and pattern-based bulk
/// deletion.
///
/// All values are text; callers serialize before storing and parse after
/// reading. Every operation is a network round trip against a remote store
/// and returns an explicit error; the typed layers above decide whether an
/// error degrades to a miss (read-through caching) or fails closed
/// (idempotency claims, session records).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the value stored under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Stores `value` under `key` only if the key is absent.
    ///
    /// Returns true if the claim was won. This is the atomic primitive the
    /// idempotency guard builds on; a plain get-then-set is a race window.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Deletes `key`. Deleting an absent key is not an error.
    async fn del(&self, key: &str) -> Result<()>;

    /// Deletes every key matching the glob `pattern`.
    async fn del_by_pattern(&self, pattern: &str) -> Result<()>;

    /// Returns true if `key` is present and unexpired.
    async fn exists(&self, key: &str) -> Result<bool>;
}

#[async_trait]
impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        (**self).del(key).await
    }

    async fn del_by_pattern(&self, pattern: &str) -> Result<()> {
        (**self).del_by_pattern(pattern).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key).await
    }
}
