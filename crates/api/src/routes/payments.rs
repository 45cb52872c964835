//! Payment verification endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use cache::CacheStore;
use checkout::{PaymentGateway, VerificationReceipt};
use store::CommerceStore;

use crate::error::ApiError;
use crate::routes::orders::AppState;

/// POST /payments/verify/:reference — confirm a gateway payment and move
/// the order to `placed`.
///
/// Unauthenticated: the gateway redirect carries no identity. The order
/// is located through the gateway's own transaction metadata, so a
/// forged reference cannot place someone else's order.
#[tracing::instrument(skip(state))]
pub async fn verify<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    Path(reference): Path<String>,
) -> Result<Json<VerificationReceipt>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: CacheStore + Clone + 'static,
{
    let receipt = state
        .orchestrator
        .verify_payment(&reference)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(receipt))
}
