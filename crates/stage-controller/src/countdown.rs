//! One-second countdowns posted back into the event actor.
//!
//! A countdown of `n` seconds posts `n, n-1, …, 0`, one tick per second,
//! starting immediately. Starting a countdown of a kind that is already
//! running replaces it.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CountdownKind {
    /// Fan moving from backstage to the stage.
    Stage,
    /// Event going live.
    GoLive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    pub kind: CountdownKind,
    pub remaining: u32,
}

/// Running countdowns, one per kind.
pub struct Countdowns {
    sender: mpsc::UnboundedSender<CountdownTick>,
    token: CancellationToken,
    running: HashMap<CountdownKind, CancellationToken>,
}

impl Countdowns {
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<CountdownTick>, parent: &CancellationToken) -> Self {
        Self {
            sender,
            token: parent.child_token(),
            running: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_running(&self, kind: CountdownKind) -> bool {
        self.running
            .get(&kind)
            .is_some_and(|token| !token.is_cancelled())
    }

    pub fn start(&mut self, kind: CountdownKind, seconds: u32) {
        self.cancel(kind);
        let token = self.token.child_token();
        let task_token = token.clone();
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            let mut remaining = seconds;
            loop {
                tokio::select! {
                    () = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if sender.send(CountdownTick { kind, remaining }).is_err() || remaining == 0 {
                            break;
                        }
                        remaining -= 1;
                    }
                }
            }
            task_token.cancel();
        });

        debug!(target: "sc.actor.event", kind = ?kind, seconds, "Countdown started");
        self.running.insert(kind, token);
    }

    pub fn cancel(&mut self, kind: CountdownKind) {
        if let Some(token) = self.running.remove(&kind) {
            token.cancel();
        }
    }

    /// Stop every running countdown. New ones can still be started.
    pub fn cancel_all(&mut self) {
        for (_, token) in self.running.drain() {
            token.cancel();
        }
    }
}
