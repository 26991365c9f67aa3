//! Prometheus metrics endpoint handler.
//!
//! Unauthenticated so Prometheus can scrape it. Labels carry no fan, user
//! or connection ids.

use crate::routes::AppState;
use axum::{extract::State, response::IntoResponse};
use std::sync::Arc;

/// Handler for GET /metrics
///
/// Returns the Prometheus text format.
#[tracing::instrument(skip_all, name = "sc.metrics.scrape")]
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.render()
}
