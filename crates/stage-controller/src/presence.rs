//! Presence & Lock Manager.
//!
//! Producer, host and celebrity are single-instance roles. Each keeps a
//! presence record in the store (`{role}Active` plus `{role}HeartBeat`) and
//! refreshes the heartbeat on a fixed period. A new instance may take the role
//! only if the record is inactive or its heartbeat is older than the timeout.
//! The check is read-then-write with no compare-and-swap: two instances
//! racing inside one heartbeat period can both win, last write wins.

use crate::errors::ScError;
use crate::observability::metrics;
use crate::roles::{PrivilegedRole, UserRole};
use crate::store::{decode, fields, DisconnectAction, EventPaths, SharedStore};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// What the store holds for one privileged role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresenceRecord {
    pub active: bool,
    /// Epoch milliseconds of the last heartbeat; `None` if never written.
    pub heartbeat_at_ms: Option<i64>,
}

impl PresenceRecord {
    /// Milliseconds since the last heartbeat. A missing heartbeat counts as infinitely stale.
    #[must_use]
    pub fn stale_ms(&self, now_ms: i64) -> i64 {
        self.heartbeat_at_ms
            .map_or(i64::MAX, |at| now_ms.saturating_sub(at))
    }

    /// Whether a new instance may take the role.
    #[must_use]
    pub fn availability(&self, now_ms: i64, timeout: Duration) -> AcquireReason {
        if !self.active {
            return AcquireReason::Vacant;
        }
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let stale_ms = self.stale_ms(now_ms);
        if stale_ms > timeout_ms {
            AcquireReason::HeartbeatExpired { stale_ms }
        } else {
            AcquireReason::AlreadyActive {
                last_heartbeat_ms: self.heartbeat_at_ms.unwrap_or_default(),
            }
        }
    }
}

/// Why an acquire was granted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason")]
pub enum AcquireReason {
    Vacant,
    HeartbeatExpired { stale_ms: i64 },
    AlreadyActive { last_heartbeat_ms: i64 },
}

impl AcquireReason {
    #[must_use]
    pub const fn is_available(&self) -> bool {
        !matches!(self, AcquireReason::AlreadyActive { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireOutcome {
    pub granted: bool,
    pub reason: AcquireReason,
}

/// Handle to a running heartbeat writer.
struct HeartbeatTask {
    role: PrivilegedRole,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Takes, refreshes and releases the presence lock of the local role.
pub struct PresenceManager {
    store: Arc<dyn SharedStore>,
    paths: EventPaths,
    interval: Duration,
    timeout: Duration,
    heartbeat: Option<HeartbeatTask>,
}

impl PresenceManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn SharedStore>,
        paths: EventPaths,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            paths,
            interval,
            timeout,
            heartbeat: None,
        }
    }

    /// Read the presence record of a role.
    pub async fn record(&self, role: PrivilegedRole) -> Result<PresenceRecord, ScError> {
        let active_path = self.paths.role_active(role);
        let heartbeat_path = self.paths.role_heartbeat(role);
        let active = decode::<bool>(&active_path, self.store.read(&active_path).await?)?;
        let heartbeat_at_ms =
            decode::<i64>(&heartbeat_path, self.store.read(&heartbeat_path).await?)?;
        Ok(PresenceRecord {
            active: active.unwrap_or(false),
            heartbeat_at_ms,
        })
    }

    /// Try to take the role. A rejection is an `Ok` outcome, never queued.
    pub async fn try_acquire(&self, role: PrivilegedRole) -> Result<AcquireOutcome, ScError> {
        self.try_acquire_at(role, now_ms()).await
    }

    /// [`Self::try_acquire`] with an explicit clock reading.
    #[instrument(skip_all, name = "sc.presence.acquire", fields(role = %role))]
    pub async fn try_acquire_at(
        &self,
        role: PrivilegedRole,
        now_ms: i64,
    ) -> Result<AcquireOutcome, ScError> {
        let record = match self.record(role).await {
            Ok(record) => record,
            Err(e) => {
                metrics::record_lock_acquire(role.as_str(), "error");
                return Err(e);
            }
        };
        let reason = record.availability(now_ms, self.timeout);

        if !reason.is_available() {
            metrics::record_lock_acquire(role.as_str(), "rejected");
            info!(target: "sc.presence", role = %role, reason = ?reason, "Presence lock rejected");
            return Ok(AcquireOutcome {
                granted: false,
                reason,
            });
        }

        if let Err(e) = self.claim(role, now_ms).await {
            metrics::record_lock_acquire(role.as_str(), "error");
            return Err(e);
        }

        metrics::record_lock_acquire(role.as_str(), "granted");
        info!(target: "sc.presence", role = %role, reason = ?reason, "Presence lock granted");
        Ok(AcquireOutcome {
            granted: true,
            reason,
        })
    }

    async fn claim(&self, role: PrivilegedRole, now_ms: i64) -> Result<(), ScError> {
        let mut claim = fields([
            (EventPaths::active_key(role).as_str(), Value::Bool(true)),
            (EventPaths::heartbeat_key(role).as_str(), json!(now_ms)),
        ]);

        match role {
            PrivilegedRole::Producer => {
                // A fresh producer never inherits a call from a dead instance
                claim.insert("privateCall".to_string(), Value::Null);
                self.store.update(self.paths.root(), claim).await?;
                self.store
                    .on_disconnect(
                        &self.paths.role_active(role),
                        DisconnectAction::Set(Value::Bool(false)),
                    )
                    .await?;
                self.store
                    .on_disconnect(&self.paths.private_call(), DisconnectAction::Remove)
                    .await?;
            }
            PrivilegedRole::Host | PrivilegedRole::Celebrity => {
                self.store.update(self.paths.root(), claim).await?;
                self.store
                    .on_disconnect(&self.paths.role_active(role), DisconnectAction::Remove)
                    .await?;
                self.store
                    .on_disconnect(
                        &self.paths.volume(role.user_role()),
                        DisconnectAction::Remove,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Give the role up. `screen_owner` is the current `screen` value.
    #[instrument(skip_all, name = "sc.presence.release", fields(role = %role))]
    pub async fn release(
        &self,
        role: PrivilegedRole,
        screen_owner: Option<UserRole>,
    ) -> Result<(), ScError> {
        self.store
            .cancel_on_disconnect(&self.paths.role_active(role))
            .await?;

        match role {
            PrivilegedRole::Producer => {
                self.store
                    .cancel_on_disconnect(&self.paths.private_call())
                    .await?;
                self.store
                    .update(
                        self.paths.root(),
                        fields([
                            (EventPaths::active_key(role).as_str(), Value::Bool(false)),
                            ("privateCall", Value::Null),
                        ]),
                    )
                    .await?;
                if screen_owner == Some(UserRole::Producer) {
                    self.store.remove(&self.paths.screen()).await?;
                }
            }
            PrivilegedRole::Host | PrivilegedRole::Celebrity => {
                self.store
                    .cancel_on_disconnect(&self.paths.volume(role.user_role()))
                    .await?;
                self.store.remove(&self.paths.role_active(role)).await?;
            }
        }

        info!(target: "sc.presence", role = %role, "Presence lock released");
        Ok(())
    }

    #[must_use]
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat
            .as_ref()
            .is_some_and(|h| !h.handle.is_finished())
    }

    /// Start refreshing the role's heartbeat. Replaces any running heartbeat.
    pub async fn start_heartbeat(&mut self, role: PrivilegedRole, parent: &CancellationToken) {
        self.stop_heartbeat().await;

        let token = parent.child_token();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&self.store),
            self.paths.role_heartbeat(role),
            role,
            self.interval,
            token.clone(),
        ));
        debug!(target: "sc.presence", role = %role, interval_ms = self.interval.as_millis(), "Heartbeat started");
        self.heartbeat = Some(HeartbeatTask {
            role,
            token,
            handle,
        });
    }

    /// Stop the heartbeat and wait for the writer to exit.
    pub async fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                warn!(target: "sc.presence", role = %task.role, error = %e, "Heartbeat task ended abnormally");
            }
            debug!(target: "sc.presence", role = %task.role, "Heartbeat stopped");
        }
    }
}

async fn run_heartbeat(
    store: Arc<dyn SharedStore>,
    path: String,
    role: PrivilegedRole,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                match store.write(&path, json!(now_ms())).await {
                    Ok(()) => metrics::record_heartbeat(role.as_str(), "success"),
                    Err(e) => {
                        // Next tick retries
                        metrics::record_heartbeat(role.as_str(), "error");
                        warn!(target: "sc.presence", role = %role, error = %e, "Heartbeat write failed");
                    }
                }
            }
        }
    }
}
