//! Stage Controller Library
//!
//! Coordination engine for a live event run over two media sessions: the
//! public "stage" and the private "backstage". It runs as one of three
//! privileged roles (producer, host, celebrity) and is responsible for:
//!
//! - Single-instance presence locking of the privileged roles
//! - Participant state driven by stream lifecycle
//! - The active fan queue and the backstage → stage promotion workflow
//! - Producer private calls, screen sharing and direct chats
//!
//! # Architecture
//!
//! ```text
//! EventActorHandle (UI commands, ControllerEvent broadcast)
//! └── EventActor (one task)
//!     └── Engine
//!         ├── SessionRegistry ── MediaSession × 2 (stage, backstage)
//!         ├── PresenceManager ── heartbeat task
//!         ├── ListenerSet ────── SharedStore watches
//!         ├── Participants, FanQueue, PrivateCallArbiter
//!         ├── ScreenShareCoordinator, ChatRouter
//!         └── Countdowns
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer**: all event state is owned by one actor task; no locks
//! - **Value-replace store**: every store notification carries the whole value at its path
//! - **Workflows log and continue**: a failed step never aborts the remaining steps
//! - **Cooperative lock**: a fresh presence record rejects a second instance; there is no queue
//!
//! # Modules
//!
//! - [`actors`] - `EventActor`, its handle and mailbox monitoring
//! - [`engine`] - Event state and dispatch of gateway, store and timer inputs
//! - [`gateway`] - Media session seam and session registry
//! - [`store`] - Shared store seam, paths and listeners
//! - [`routes`] - `/health` and `/metrics` for probes and scraping
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types and how they surface

pub mod actors;
pub mod chat;
pub mod config;
pub mod countdown;
pub mod engine;
pub mod errors;
pub mod fans;
pub mod gateway;
pub mod handlers;
pub mod observability;
pub mod participants;
pub mod presence;
pub mod private_call;
pub mod promotion;
pub mod roles;
pub mod routes;
pub mod screen_share;
pub mod signaling;
pub mod store;
pub mod workflow;
