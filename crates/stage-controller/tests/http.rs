//! Operational HTTP endpoints.
//!
//! Verifies:
//! - `/health` reports the joined role and show status
//! - `/health` answers 503 once the actor is gone
//! - `/metrics` renders the Prometheus text format

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use sc_test_utils::{test_settings, MockMediaSession};
use serde_json::Value;
use stage_controller::actors::{EventActor, EventActorHandle};
use stage_controller::gateway::SessionRegistry;
use stage_controller::roles::{PrivilegedRole, SessionName};
use stage_controller::routes::{build_routes, AppState};
use stage_controller::store::MemoryStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn spawn_host() -> (EventActorHandle, JoinHandle<()>) {
    let stage = MockMediaSession::new(SessionName::Stage);
    EventActor::spawn(
        test_settings(PrivilegedRole::Host),
        Arc::new(MemoryStore::new()),
        SessionRegistry::new(stage.as_session(), None),
        CancellationToken::new(),
    )
}

fn app(handle: &EventActorHandle) -> Router {
    // Not installed globally, so each test gets its own registry
    let recorder = PrometheusBuilder::new().build_recorder();
    build_routes(Arc::new(AppState {
        handle: handle.clone(),
        metrics: recorder.handle(),
    }))
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health_reports_joined_role() {
    let (handle, task) = spawn_host();

    let (status, body) = get(app(&handle), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["role"], "host");
    assert_eq!(json["joined"], false);

    handle.join().await.unwrap();
    let (_, body) = get(app(&handle), "/health").await;
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["joined"], true);
    assert_eq!(json["eventStatus"], "preshow");

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_health_is_unavailable_after_shutdown() {
    let (handle, task) = spawn_host();
    handle.cancel();
    task.await.unwrap();

    let (status, body) = get(app(&handle), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "unhealthy");
    assert!(json.get("eventStatus").is_none());
}

#[tokio::test]
async fn test_metrics_and_unknown_routes() {
    let (handle, task) = spawn_host();

    let (status, _) = get(app(&handle), "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(app(&handle), "/v1/nonexistent").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    handle.cancel();
    task.await.unwrap();
}
