//! # Stage Controller Test Utilities
//!
//! Mocks and fixtures for driving the stage controller without a media
//! provider or a hosted store.
//!
//! ## Modules
//!
//! - `mock_session` - Recording [`MediaSession`](stage_controller::gateway::MediaSession) with failure injection
//! - `mock_store` - [`SharedStore`](stage_controller::store::SharedStore) wrapper that fails writes at chosen paths
//! - `fixtures` - Fan records, stream handles, seeded stores and settings
//! - `assertions` - Waiting for the event actor to reach a state
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = store_with_fans(&[("42", "Ada", "fan-42")]).await;
//!     let stage = MockMediaSession::new(SessionName::Stage);
//!     let backstage = MockMediaSession::new(SessionName::Backstage);
//!     let registry = SessionRegistry::new(stage.as_session(), Some(backstage.as_session()));
//!
//!     let (handle, _task) = EventActor::spawn(
//!         test_settings(PrivilegedRole::Producer),
//!         Arc::new(store.clone()),
//!         registry,
//!         CancellationToken::new(),
//!     );
//!     handle.join().await.unwrap();
//!     backstage.emit_stream_created(fan_stream("42", "fan-42")).await;
//! }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_session;
pub mod mock_store;

pub use assertions::*;
pub use fixtures::*;
pub use mock_session::*;
pub use mock_store::*;
