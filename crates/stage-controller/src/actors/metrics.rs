//! Mailbox backlog of the event actor.
//!
//! | Normal | Warning | Critical |
//! |--------|---------|----------|
//! | < 50   | 50-200  | > 200    |
//!
//! The backlog is also exported as `sc_actor_mailbox_depth{actor_type="event"}`.

use crate::observability::metrics;
use tracing::{debug, warn};

pub const EVENT_MAILBOX_NORMAL: usize = 50;
pub const EVENT_MAILBOX_WARNING: usize = 200;

/// Backlog level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

impl MailboxLevel {
    #[must_use]
    pub const fn for_depth(depth: usize) -> Self {
        if depth > EVENT_MAILBOX_WARNING {
            MailboxLevel::Critical
        } else if depth > EVENT_MAILBOX_NORMAL {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Owned by the actor loop; sampled once per handled message.
#[derive(Debug)]
pub struct MailboxMonitor {
    event_root: String,
    level: MailboxLevel,
    processed: u64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(event_root: impl Into<String>) -> Self {
        Self {
            event_root: event_root.into(),
            level: MailboxLevel::Normal,
            processed: 0,
        }
    }

    /// Record a handled message and the backlog still queued behind it.
    pub fn record(&mut self, backlog: usize) {
        self.processed += 1;
        metrics::set_actor_mailbox_depth("event", backlog);

        let level = MailboxLevel::for_depth(backlog);
        if level == self.level {
            return;
        }
        // Logged on transitions only
        match level {
            MailboxLevel::Critical => warn!(
                target: "sc.actor.mailbox",
                event_root = %self.event_root,
                depth = backlog,
                threshold = EVENT_MAILBOX_WARNING,
                "Mailbox depth critical"
            ),
            MailboxLevel::Warning => debug!(
                target: "sc.actor.mailbox",
                event_root = %self.event_root,
                depth = backlog,
                "Mailbox depth elevated"
            ),
            MailboxLevel::Normal => debug!(
                target: "sc.actor.mailbox",
                event_root = %self.event_root,
                "Mailbox drained"
            ),
        }
        self.level = level;
    }

    #[must_use]
    pub fn level(&self) -> MailboxLevel {
        self.level
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.processed
    }
}
