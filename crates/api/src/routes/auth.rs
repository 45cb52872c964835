//! Refresh token rotation and revocation.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use cache::CacheStore;
use checkout::PaymentGateway;
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// POST /auth/refresh — rotate a refresh token. The old token is dead
/// the moment the new one exists.
#[tracing::instrument(skip_all)]
pub async fn refresh<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: CacheStore + Clone + 'static,
{
    let (user_id, token) = state.sessions.rotate(&req.refresh_token).await?;
    Ok(Json(RefreshResponse {
        user_id: user_id.to_string(),
        refresh_token: token,
    }))
}

/// POST /auth/logout — revoke a refresh token. Revoking an unknown token
/// still succeeds.
#[tracing::instrument(skip_all)]
pub async fn logout<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    Json(req): Json<RefreshRequest>,
) -> Result<StatusCode, ApiError>
where
    S: CommerceStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: CacheStore + Clone + 'static,
{
    state.sessions.revoke(&req.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}
