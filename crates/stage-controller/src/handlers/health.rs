//! Health check handler.
//!
//! Asks the event actor for its state. An actor that no longer answers is
//! reported unhealthy with 503 so probes restart the instance.

use crate::engine::EventStatus;
use crate::roles::PrivilegedRole;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Health response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "healthy" or "unhealthy".
    pub status: String,

    pub role: PrivilegedRole,

    /// Whether this instance holds the role's presence lock.
    pub joined: bool,

    /// Show lifecycle, omitted when the actor did not answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_status: Option<EventStatus>,
}

/// Handler for GET /health
///
/// ```json
/// { "status": "healthy", "role": "producer", "joined": true, "eventStatus": "preshow" }
/// ```
#[instrument(skip_all, name = "sc.health.check")]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let role = state.handle.role();

    if state.handle.is_cancelled() {
        return unhealthy(role);
    }

    match state.handle.get_state().await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                role,
                joined: snapshot.joined,
                event_status: Some(snapshot.status),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Event actor did not answer health check");
            unhealthy(role)
        }
    }
}

fn unhealthy(role: PrivilegedRole) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(HealthResponse {
            status: "unhealthy".to_string(),
            role,
            joined: false,
            event_status: None,
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unhealthy_response_omits_event_status() {
        let (code, Json(body)) = unhealthy(PrivilegedRole::Host);
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);

        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"status\":\"unhealthy\""));
        assert!(json.contains("\"role\":\"host\""));
        assert!(!json.contains("eventStatus"));
    }
}
