//! Typed cache-aside layer over a [`CacheStore`].

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::store::CacheStore;

/// Per-call cache options: expiration and key namespacing.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    pub ttl: Option<Duration>,
    pub prefix: Option<&'static str>,
}

impl CacheOptions {
    /// Options with a TTL and no prefix.
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            prefix: None,
        }
    }

    /// Options with a key prefix and a TTL.
    pub fn prefixed(prefix: &'static str, ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            prefix: Some(prefix),
        }
    }
}

/// Cache-aside service: JSON serialization, key prefixing and
/// degrade-to-miss error handling over a raw [`CacheStore`].
///
/// The cache is strictly an optimization here. A read failure is a miss, a
/// parse failure is a miss, a write failure is logged and swallowed.
/// Callers that need the store to be authoritative (idempotency claims,
/// session records) use their own fail-closed wrappers instead.
#[derive(Clone)]
pub struct CacheService<S> {
    store: S,
}

impl<S: CacheStore> CacheService<S> {
    /// Creates a cache service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn full_key(key: &str, options: CacheOptions) -> String {
        match options.prefix {
            Some(prefix) => format!("{prefix}:{key}"),
            None => key.to_string(),
        }
    }

    /// Reads and deserializes a cached value. Any failure is a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, options: CacheOptions) -> Option<T> {
        let full_key = Self::full_key(key, options);
        let raw = match self.store.get(&full_key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "cache get failed, treating as miss");
                metrics::counter!("cache_errors_total").increment(1);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                metrics::counter!("cache_hits_total").increment(1);
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "cached value failed to parse, treating as miss");
                None
            }
        }
    }

    /// Serializes and stores a value. Failures are logged and swallowed.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, options: CacheOptions) {
        let full_key = Self::full_key(key, options);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %full_key, error = %e, "cache value failed to serialize");
                return;
            }
        };
        if let Err(e) = self.store.set(&full_key, &raw, options.ttl).await {
            tracing::warn!(key = %full_key, error = %e, "cache set failed");
            metrics::counter!("cache_errors_total").increment(1);
        }
    }

    /// Deletes a cached value. Failures are logged and swallowed.
    pub async fn del(&self, key: &str, options: CacheOptions) {
        let full_key = Self::full_key(key, options);
        if let Err(e) = self.store.del(&full_key).await {
            tracing::warn!(key = %full_key, error = %e, "cache delete failed");
        }
    }

    /// Deletes every key matching `pattern`. Failures are logged and
    /// swallowed.
    pub async fn invalidate_pattern(&self, pattern: &str) {
        if let Err(e) = self.store.del_by_pattern(pattern).await {
            tracing::warn!(%pattern, error = %e, "cache pattern invalidation failed");
        }
    }

    /// Cache-aside read: returns the cached value on a hit, otherwise runs
    /// `compute`, stores its result under `key` and returns it.
    ///
    /// No lock is held across `compute`; concurrent misses for the same key
    /// may each invoke it. That is acceptable for idempotent reads and
    /// exactly why side-effecting operations go through the idempotency
    /// guard instead.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        options: CacheOptions,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(cached) = self.get(key, options).await {
            return Ok(cached);
        }
        metrics::counter!("cache_misses_total").increment(1);
        let value = compute().await?;
        self.set(key, &value, options).await;
        Ok(value)
    }
}
