//! At-most-one-execution guard for side-effecting operations.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::CacheError;
use crate::keys;
use crate::store::CacheStore;

/// Marker stored while the guarded operation is still executing.
const CLAIM_SENTINEL: &str = "__in_flight__";

/// Errors raised by the idempotency guard.
///
/// Unlike the cache-aside layer, the guard fails closed: if the store is
/// unreachable it refuses to run the operation rather than risk double
/// execution.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// The caller supplied no token, or an empty one. An empty token would
    /// dedupe unrelated requests, so it is rejected outright.
    #[error("Idempotency token is missing or empty")]
    MissingToken,

    /// Another call with the same token is still executing and did not
    /// finish within the wait window.
    #[error("A request with this idempotency token is already in flight")]
    InFlight,

    /// The claim could not be taken or checked because the store is down.
    #[error("Idempotency store unavailable: {0}")]
    StoreUnavailable(#[from] CacheError),

    /// A stored result could not be decoded.
    #[error("Stored idempotency record is corrupt: {0}")]
    CorruptRecord(#[from] serde_json::Error),
}

/// Deduplicates side-effecting operations identified by a caller-supplied
/// token.
///
/// The race window of the plain get/compute/set pattern is closed with an
/// atomic set-if-absent claim on the token key: the first caller wins the
/// claim and runs the operation; a concurrent duplicate observes the claim
/// and waits for the result instead of re-running the operation. On failure
/// the claim is deleted so a client retry can execute again.
#[derive(Clone)]
pub struct IdempotencyGuard<S> {
    store: S,
    claim_ttl: Duration,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl<S: CacheStore> IdempotencyGuard<S> {
    /// Creates a guard with default claim and wait windows.
    pub fn new(store: S) -> Self {
        Self {
            store,
            // Bounds an abandoned claim if the process dies mid-operation.
            claim_ttl: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
            wait_timeout: Duration::from_secs(5),
        }
    }

    /// Overrides the polling parameters. Used by tests to keep waits short.
    pub fn with_wait(mut self, poll_interval: Duration, wait_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.wait_timeout = wait_timeout;
        self
    }

    /// Runs `operation` at most once for the given token.
    ///
    /// A populated record short-circuits to the stored result. A concurrent
    /// in-flight call with the same token is waited on up to the wait
    /// window, then surfaced as [`IdempotencyError::InFlight`].
    #[tracing::instrument(skip(self, operation), fields(token_len = token.len()))]
    pub async fn run<T, E, F, Fut>(
        &self,
        token: &str,
        ttl: Duration,
        operation: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<IdempotencyError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if token.trim().is_empty() {
            return Err(IdempotencyError::MissingToken.into());
        }
        let key = keys::idempotency(token);
        let deadline = tokio::time::Instant::now() + self.wait_timeout;

        loop {
            let claimed = self
                .store
                .set_if_absent(&key, CLAIM_SENTINEL, Some(self.claim_ttl))
                .await
                .map_err(IdempotencyError::StoreUnavailable)?;

            if claimed {
                break;
            }

            // Claim lost: either a result is already stored or another call
            // is mid-flight.
            let raw = self
                .store
                .get(&key)
                .await
                .map_err(IdempotencyError::StoreUnavailable)?;
            match raw.as_deref() {
                Some(CLAIM_SENTINEL) => {
                    if tokio::time::Instant::now() >= deadline {
                        metrics::counter!("idempotency_in_flight_total").increment(1);
                        return Err(IdempotencyError::InFlight.into());
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Some(raw) => {
                    metrics::counter!("idempotency_replays_total").increment(1);
                    tracing::debug!("returning stored idempotency result");
                    let value =
                        serde_json::from_str(raw).map_err(IdempotencyError::CorruptRecord)?;
                    return Ok(value);
                }
                // The first call failed and released its claim between our
                // two observations; loop and try to claim again.
                None => {}
            }
        }

        self.execute(&key, ttl, operation).await
    }

    async fn execute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        operation: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<IdempotencyError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match operation().await {
            Ok(value) => {
                match serde_json::to_string(&value) {
                    Ok(raw) => {
                        // The result overwrites the sentinel. If the write
                        // fails the sentinel expires with the claim TTL and
                        // a later retry recomputes; the operation itself
                        // already committed.
                        if let Err(e) = self.store.set(key, &raw, Some(ttl)).await {
                            tracing::warn!(%key, error = %e, "failed to store idempotency result");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%key, error = %e, "idempotency result failed to serialize");
                    }
                }
                Ok(value)
            }
            Err(e) => {
                // Release the claim so the client can retry.
                if let Err(del_err) = self.store.del(key).await {
                    tracing::warn!(%key, error = %del_err, "failed to release idempotency claim");
                }
                Err(e)
            }
        }
    }
}
