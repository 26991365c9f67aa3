//! Stage Controller
//!
//! Runs one privileged role (producer, host or celebrity) of a live event and
//! logs every event the engine raises.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Open the shared store (`memory://` is the built-in store)
//! 4. Register the media sessions (stage, plus backstage for the producer)
//! 5. Bind the `/health` and `/metrics` listener
//! 6. Spawn the `EventActor`, join the event and start serving HTTP
//! 7. Wait for shutdown signal, then leave

#![warn(clippy::pedantic)]

use std::sync::Arc;

use common::secret::ExposeSecret;
use stage_controller::actors::EventActor;
use stage_controller::config::Config;
use stage_controller::engine::EngineSettings;
use stage_controller::errors::ScError;
use stage_controller::gateway::{LoopbackSession, MediaSession, SessionRegistry};
use stage_controller::observability::init_metrics_recorder;
use stage_controller::routes::{build_routes, AppState};
use stage_controller::roles::{PrivilegedRole, SessionName};
use stage_controller::store::{MemoryStore, SharedStore};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MEMORY_STORE_SCHEME: &str = "memory://";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stage_controller=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Stage Controller");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        role = %config.role,
        event_root = %config.event_root,
        user_id = %config.user_id,
        producer_host = config.producer_host,
        heartbeat_interval_seconds = config.heartbeat_interval_seconds,
        heartbeat_timeout_seconds = config.heartbeat_timeout_seconds,
        http_bind_address = %config.http_bind_address,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let store = open_store(&config)?;
    let registry = build_registry(config.role);

    let listener = tokio::net::TcpListener::bind(config.http_bind_address)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to bind HTTP listener");
            e
        })?;

    let cancel_token = CancellationToken::new();
    let (handle, actor_task) = EventActor::spawn(
        EngineSettings::from_config(&config),
        store,
        registry,
        cancel_token.child_token(),
    );

    let mut events = handle.subscribe_events();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(target: "sc.ui", event = %json, "Controller event"),
                    Err(e) => warn!(target: "sc.ui", error = %e, "Unserializable controller event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "sc.ui", skipped, "Event log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Err(e) = handle.join().await {
        error!(error = %e, "Failed to join event");
        handle.cancel();
        let _ = actor_task.await;
        return Err(e.into());
    }

    let app = build_routes(Arc::new(AppState {
        handle: handle.clone(),
        metrics: prometheus_handle,
    }));
    let http_token = cancel_token.clone();
    let http_server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_token.cancelled().await })
            .await
    });
    info!(address = %config.http_bind_address, "Serving /health and /metrics");

    info!(role = %handle.role(), "Stage Controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, leaving event...");
    cancel_token.cancel();
    if let Err(e) = actor_task.await {
        warn!(error = %e, "Event actor ended abnormally");
    }
    match http_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "HTTP server ended with error"),
        Err(e) => warn!(error = %e, "HTTP server task ended abnormally"),
    }
    event_log.abort();

    info!("Stage Controller shutdown complete");
    Ok(())
}

/// Open the shared store named by the configuration.
fn open_store(config: &Config) -> Result<Arc<dyn SharedStore>, ScError> {
    let url = config.store_url.expose_secret();
    if url.starts_with(MEMORY_STORE_SCHEME) {
        info!("Using in-memory shared store");
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Err(ScError::Config(format!(
            "unsupported store scheme, expected {MEMORY_STORE_SCHEME}"
        )))
    }
}

/// Stage for every role; the producer also works the backstage session.
fn build_registry(role: PrivilegedRole) -> SessionRegistry {
    let stage: Arc<dyn MediaSession> = Arc::new(LoopbackSession::new(SessionName::Stage));
    let backstage: Option<Arc<dyn MediaSession>> = match role {
        PrivilegedRole::Producer => Some(Arc::new(LoopbackSession::new(SessionName::Backstage))),
        PrivilegedRole::Host | PrivilegedRole::Celebrity => None,
    };
    SessionRegistry::new(stage, backstage)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
