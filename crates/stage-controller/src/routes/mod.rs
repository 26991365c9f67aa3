//! HTTP routes for the operational endpoints.

use crate::actors::EventActorHandle;
use crate::handlers;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout for the operational endpoints.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared by the handlers.
#[derive(Clone)]
pub struct AppState {
    pub handle: EventActorHandle,
    pub metrics: PrometheusHandle,
}

/// Build the router:
/// - `/health` - liveness of the event actor
/// - `/metrics` - Prometheus scrape
pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}
