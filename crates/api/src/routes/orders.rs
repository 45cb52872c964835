//! Order placement, reads and administrative status updates.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use cache::{
    CacheOptions, CacheService, CacheStore, IdempotencyGuard, RefreshTokenStore, keys,
};
use checkout::{CheckoutError, OrderOrchestrator, OrderReader, PaymentGateway, PlacedOrder};
use common::{Money, OrderId};
use domain::{Order, OrderStatus};
use serde::{Deserialize, Serialize};
use store::{CommerceStore, StoreTx as _};

use crate::error::ApiError;
use crate::guard::RequestContext;

/// Flat shipping fee applied to every order, in major units.
const SHIPPING_FEE_MAJOR: i64 = 30;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CommerceStore, G, C: CacheStore> {
    pub orchestrator: OrderOrchestrator<S, G, C>,
    pub reader: OrderReader<S, C>,
    pub store: S,
    pub cache: CacheService<C>,
    pub idempotency: IdempotencyGuard<C>,
    pub sessions: RefreshTokenStore<C>,
}

impl<S, G, C> AppState<S, G, C>
where
    S: CommerceStore + Clone,
    G: PaymentGateway,
    C: CacheStore + Clone,
{
    /// Wires the state from its three backends.
    pub fn new(store: S, gateway: G, cache_store: C, api_url: &str) -> Self {
        let cache = CacheService::new(cache_store.clone());
        Self {
            orchestrator: OrderOrchestrator::new(
                store.clone(),
                gateway,
                cache.clone(),
                api_url,
            ),
            reader: OrderReader::new(store.clone(), cache.clone()),
            store,
            cache,
            idempotency: IdempotencyGuard::new(cache_store.clone()),
            sessions: RefreshTokenStore::new(cache_store),
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Serialize)]
pub struct UpdateStatusResponse {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub status: String,
}

/// POST /orders — place the authenticated user's cart as an order.
///
/// The `Idempotency-Key` header is mandatory; retries with the same key
/// replay the stored response instead of placing again.
#[tracing::instrument(skip_all, fields(user_id = %ctx.user_id))]
pub async fn place<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    ctx: RequestContext,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: CommerceStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: CacheStore + Clone + 'static,
{
    let token = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let placed: Result<Option<PlacedOrder>, CheckoutError> = state
        .idempotency
        .run(token, keys::TTL_VERY_LONG, || async {
            state
                .orchestrator
                .place_order(ctx.user_id, &ctx.email, Money::from_major(SHIPPING_FEE_MAJOR))
                .await
        })
        .await;

    match placed.map_err(ApiError::from)? {
        Some(placed) => Ok((StatusCode::CREATED, Json(placed)).into_response()),
        // Nothing to place: an empty payload, not an error.
        None => Ok((StatusCode::OK, Json(serde_json::json!([]))).into_response()),
    }
}

/// GET /orders — list the authenticated user's orders, newest first.
#[tracing::instrument(skip_all, fields(user_id = %ctx.user_id))]
pub async fn list<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    ctx: RequestContext,
) -> Result<Json<Vec<Order>>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: CacheStore + Clone + 'static,
{
    let orders = state
        .reader
        .orders_for_user(ctx.user_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(orders))
}

/// GET /orders/:id — load one order. Users see only their own orders;
/// admins see any.
#[tracing::instrument(skip_all, fields(user_id = %ctx.user_id, order_id = %id))]
pub async fn get<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: CacheStore + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let order = state
        .reader
        .order(order_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    // Ownership is enforced as absence, not forbidden, so ids cannot be
    // probed.
    if order.user_id != ctx.user_id && !ctx.admin {
        return Err(ApiError::NotFound(format!("Order {id} not found")));
    }

    Ok(Json(order))
}

/// PATCH /orders/:id/status — administrative status transition
/// (placed → shipped → delivered).
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn update_status<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    ctx: RequestContext,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, ApiError>
where
    S: CommerceStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: CacheStore + Clone + 'static,
{
    ctx.require_admin()?;
    let order_id = parse_order_id(&id)?;
    let next: OrderStatus = req.status.parse().map_err(ApiError::from)?;

    let mut tx = state.store.begin().await?;
    let order = tx
        .order_by_id(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    let next = order.status.transition_to(next)?;
    tx.set_order_status(order_id, next).await?;
    tx.commit().await?;

    state
        .cache
        .del(
            &order_id.to_string(),
            CacheOptions {
                ttl: None,
                prefix: Some(keys::PREFIX_ORDER),
            },
        )
        .await;
    state
        .cache
        .del(
            &keys::by_user(&order.user_id.to_string()),
            CacheOptions {
                ttl: None,
                prefix: Some(keys::PREFIX_ORDERS),
            },
        )
        .await;

    Ok(Json(UpdateStatusResponse {
        order_id: order_id.to_string(),
        status: next.to_string(),
    }))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid order id: {id}")))
}
