//! Prometheus metrics endpoint.
//!
//! Renders the checkout counters and histograms the placement saga
//! records: `checkout_orders_attempted_total`,
//! `checkout_orders_placed_total` and `checkout_duration_seconds`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics — returns Prometheus-formatted metrics.
pub async fn render(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
