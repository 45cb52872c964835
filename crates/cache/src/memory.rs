//! In-memory cache store for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::store::CacheStore;
use crate::Result;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory cache store implementation for testing.
///
/// Provides the same interface as the Redis implementation, plus failure
/// injection so callers can exercise their degraded paths.
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryCacheStore {
    /// Creates a new empty in-memory cache store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every read operation fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every write operation fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of live entries.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    /// Returns true if no live entries exist.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(
                "injected write failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Glob match supporting only the `*` wildcard, which is all the key
/// invalidation patterns use.
fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !key.starts_with(first) {
        return false;
    }
    let mut rest = &key[first.len()..];
    let mut last_part: Option<&str> = None;
    for part in parts {
        last_part = Some(part);
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    match last_part {
        // Pattern had no '*': exact match required.
        None => rest.is_empty(),
        // Pattern ended with '*': anything may follow.
        Some("") => true,
        // Pattern ended with a literal: it must be a suffix.
        Some(part) => key.ends_with(part) || rest.is_empty(),
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_read()?;
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.check_write()?;
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        self.check_write()?;
        let mut entries = self.entries.write().await;
        let occupied = entries.get(key).is_some_and(|e| !e.is_expired());
        if occupied {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.check_write()?;
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn del_by_pattern(&self, pattern: &str) -> Result<()> {
        self.check_write()?;
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_read()?;
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|e| !e.is_expired()))
    }
}
