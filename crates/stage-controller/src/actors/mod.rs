//! Actor layer.
//!
//! ```text
//! EventActorHandle (cloneable, held by the UI)
//! └── EventActor (one task per joined event)
//!     └── owns Engine
//!         ├── heartbeat task (writes presence directly)
//!         ├── store listener tasks ─▶ store channel
//!         ├── countdown tasks ─▶ countdown channel
//!         └── media sessions ─▶ gateway channel
//! ```
//!
//! - [`event`] - `EventActor` and its handle
//! - [`messages`] - Mailbox message types
//! - [`metrics`] - Mailbox monitoring

pub mod event;
pub mod messages;
pub mod metrics;

pub use event::{EventActor, EventActorHandle};
pub use messages::EventMessage;
pub use metrics::{MailboxLevel, MailboxMonitor};
