//! Pre-configured test data for stage controller tests.
//!
//! Provides:
//! - Active fan records as the store holds them
//! - Stream handles for every role, on either session
//! - A `MemoryStore` seeded with a waiting line
//! - Connections that carry role metadata

use serde_json::{json, Value};
use stage_controller::engine::EngineSettings;
use stage_controller::gateway::{Connection, StreamHandle, VideoType};
use stage_controller::roles::PrivilegedRole;
use stage_controller::store::{EventPaths, MemoryStore};

use common::types::{FanId, StreamId};

/// Event root used by every fixture.
pub const TEST_EVENT_ROOT: &str = "event";

/// A waiting-line record for `activeFans/{fanId}`.
#[must_use]
pub fn fan_record(name: &str, stream_id: &str) -> Value {
    json!({
        "name": name,
        "streamId": stream_id,
        "isBackstage": false,
        "isOnStage": false,
        "inPrivateCall": false,
    })
}

/// Connection whose metadata names `user_type`.
#[must_use]
pub fn connection_for(user_type: &str, connection_id: &str) -> Connection {
    Connection::new(connection_id, json!({ "userType": user_type }).to_string())
}

/// The producer's stage connection.
#[must_use]
pub fn producer_connection() -> Connection {
    connection_for("producer", "conn-producer")
}

/// Camera stream published by `user_type`. The connection id is `conn-{stream_id}`.
#[must_use]
pub fn stream_for(user_type: &str, stream_id: &str) -> StreamHandle {
    StreamHandle {
        stream_id: StreamId::new(stream_id),
        connection: connection_for(user_type, &format!("conn-{stream_id}")),
        video_type: VideoType::Camera,
    }
}

/// Screen stream published by `user_type`.
#[must_use]
pub fn screen_stream_for(user_type: &str, stream_id: &str) -> StreamHandle {
    StreamHandle {
        video_type: VideoType::Screen,
        ..stream_for(user_type, stream_id)
    }
}

/// Backstage camera stream of a fan still waiting in line.
#[must_use]
pub fn fan_stream(fan_id: &str, stream_id: &str) -> StreamHandle {
    StreamHandle {
        stream_id: StreamId::new(stream_id),
        connection: Connection::new(
            format!("conn-{stream_id}"),
            json!({ "userType": "activeFan", "fanId": fan_id }).to_string(),
        ),
        video_type: VideoType::Camera,
    }
}

/// Store seeded with `(fan_id, name, stream_id)` records under the test root.
pub async fn store_with_fans(fans: &[(&str, &str, &str)]) -> MemoryStore {
    let store = MemoryStore::new();
    let paths = EventPaths::new(TEST_EVENT_ROOT);
    for (fan_id, name, stream_id) in fans {
        store
            .seed(&paths.active_fan(&FanId::new(*fan_id)), fan_record(name, stream_id))
            .await;
    }
    store
}

/// Engine settings for tests: default timers, zero-length countdowns.
#[must_use]
pub fn test_settings(role: PrivilegedRole) -> EngineSettings {
    EngineSettings {
        event_root: TEST_EVENT_ROOT.to_string(),
        stage_countdown_seconds: 0,
        go_live_countdown_seconds: 0,
        ..EngineSettings::new(role)
    }
}
