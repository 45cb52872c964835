//! Refresh token storage for session continuity.

use chrono::Utc;
use common::UserId;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CacheError;
use crate::keys;
use crate::store::CacheStore;

/// Errors raised by the refresh token store.
///
/// Session records are correctness-bearing, so cache failures surface here
/// instead of degrading to a miss.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The token is absent, expired or malformed.
    #[error("Invalid or expired refresh token")]
    Unauthorized,

    /// The token store is unreachable.
    #[error("Session store error: {0}")]
    Cache(#[from] CacheError),

    /// A token record could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The persisted shape of a refresh token record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    /// Expiry as epoch milliseconds; validated on every use in addition to
    /// the cache-level TTL.
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
}

/// Issues, rotates and revokes refresh tokens backed by the cache store.
#[derive(Clone)]
pub struct RefreshTokenStore<S> {
    store: S,
}

impl<S: CacheStore> RefreshTokenStore<S> {
    /// Creates a refresh token store over the given cache store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Generates a high-entropy token and stores its record under a
    /// one-week TTL.
    pub async fn issue(&self, user_id: UserId) -> Result<String, SessionError> {
        let token = generate_token();
        let record = RefreshTokenRecord {
            user_id,
            expires_at: Utc::now().timestamp_millis() + keys::TTL_WEEK.as_millis() as i64,
        };
        let raw = serde_json::to_string(&record)?;
        self.store
            .set(&keys::refresh_token(&token), &raw, Some(keys::TTL_WEEK))
            .await?;
        Ok(token)
    }

    /// Returns the owning user if the token is present and unexpired.
    pub async fn validate(&self, token: &str) -> Result<Option<UserId>, SessionError> {
        let raw = self.store.get(&keys::refresh_token(token)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let record: RefreshTokenRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "refresh token record failed to parse");
                return Ok(None);
            }
        };
        if record.expires_at < Utc::now().timestamp_millis() {
            return Ok(None);
        }
        Ok(Some(record.user_id))
    }

    /// Rotates a token: validates it, deletes the old record, then issues a
    /// new one. Delete-then-create ordering means the old and new token are
    /// never both valid.
    pub async fn rotate(&self, token: &str) -> Result<(UserId, String), SessionError> {
        let user_id = self
            .validate(token)
            .await?
            .ok_or(SessionError::Unauthorized)?;
        self.store.del(&keys::refresh_token(token)).await?;
        let new_token = self.issue(user_id).await?;
        Ok((user_id, new_token))
    }

    /// Deletes a token unconditionally. Revoking an absent token is a no-op.
    pub async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        self.store.del(&keys::refresh_token(token)).await?;
        Ok(())
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
