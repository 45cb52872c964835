//! Cache error types.

use thiserror::Error;

/// Errors that can occur against the cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The Redis backend returned an error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The backend is unreachable or refused the operation.
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
