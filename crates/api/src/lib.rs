//! HTTP API for the checkout system.
//!
//! REST endpoints for idempotent order placement, payment verification,
//! cached order reads and refresh token sessions, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod guard;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use cache::{CacheStore, InMemoryCacheStore};
use checkout::{InMemoryPaymentGateway, PaymentGateway};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CommerceStore, InMemoryStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, G, C>(
    state: Arc<AppState<S, G, C>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: CommerceStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: CacheStore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::place::<S, G, C>))
        .route("/orders", get(routes::orders::list::<S, G, C>))
        .route("/orders/{id}", get(routes::orders::get::<S, G, C>))
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S, G, C>),
        )
        .route(
            "/payments/verify/{reference}",
            post(routes::payments::verify::<S, G, C>),
        )
        .route("/auth/refresh", post(routes::auth::refresh::<S, G, C>))
        .route("/auth/logout", post(routes::auth::logout::<S, G, C>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// State wired entirely from in-memory backends. Used by tests and for
/// running the API without external services.
pub type InMemoryAppState = AppState<InMemoryStore, InMemoryPaymentGateway, InMemoryCacheStore>;

/// The backends behind an in-memory state, kept for seeding and
/// inspection.
pub struct InMemoryBackends {
    pub store: InMemoryStore,
    pub gateway: InMemoryPaymentGateway,
    pub cache: InMemoryCacheStore,
}

/// Creates application state over in-memory backends.
pub fn create_in_memory_state(api_url: &str) -> (Arc<InMemoryAppState>, InMemoryBackends) {
    let store = InMemoryStore::new();
    let gateway = InMemoryPaymentGateway::new();
    let cache = InMemoryCacheStore::new();

    let state = Arc::new(AppState::new(
        store.clone(),
        gateway.clone(),
        cache.clone(),
        api_url,
    ));
    (
        state,
        InMemoryBackends {
            store,
            gateway,
            cache,
        },
    )
}
