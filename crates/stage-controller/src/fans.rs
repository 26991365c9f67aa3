//! Active Fan Queue.
//!
//! The store publishes the whole `activeFans` map on every change. The queue
//! keeps the previous snapshot and diffs each new one against it. A record
//! with a `name` is in line; records without one are fans still setting up.

use crate::engine::Engine;
use crate::observability::metrics;
use crate::roles::FanSeat;
use crate::store::StoreWatch;
use common::types::{FanId, StreamId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// A fan's record under `activeFans/{fanId}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveFan {
    /// Store key.
    #[serde(skip_deserializing)]
    pub fan_id: FanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Camera stream on the backstage session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<StreamId>,
    #[serde(default)]
    pub is_backstage: bool,
    #[serde(default)]
    pub is_on_stage: bool,
    #[serde(default)]
    pub in_private_call: bool,
    /// Arrival sequence assigned when the record was first seen.
    #[serde(skip_deserializing)]
    pub order: u64,
}

impl ActiveFan {
    #[must_use]
    pub fn is_in_line(&self) -> bool {
        self.name.is_some()
    }

    /// Waiting in line, neither backstage nor on stage.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.is_in_line() && !self.is_backstage && !self.is_on_stage
    }

    /// Chat recipient type for this fan.
    #[must_use]
    pub fn chat_type(&self) -> &'static str {
        if self.is_backstage {
            "backstageFan"
        } else if self.is_on_stage {
            "fan"
        } else {
            "activeFan"
        }
    }
}

/// Result of reconciling one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDiff {
    /// In-line fans that are gone, with their last known record.
    pub removed: Vec<ActiveFan>,
    /// Fans that entered the line.
    pub added: Vec<FanId>,
    pub backstage: Option<ActiveFan>,
    pub on_stage: Option<ActiveFan>,
}

/// The producer's view of `activeFans`.
#[derive(Debug, Default)]
pub struct FanQueue {
    records: BTreeMap<FanId, ActiveFan>,
    next_order: u64,
}

impl FanQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked snapshot and report what changed.
    ///
    /// Malformed records are skipped.
    pub fn reconcile(&mut self, snapshot: Option<&Value>) -> QueueDiff {
        let previous_in_line: BTreeSet<FanId> = self
            .records
            .values()
            .filter(|f| f.is_in_line())
            .map(|f| f.fan_id.clone())
            .collect();

        let mut next = BTreeMap::new();
        if let Some(Value::Object(map)) = snapshot {
            for (key, raw) in map {
                let fan_id = FanId::new(key.clone());
                let mut fan: ActiveFan = match serde_json::from_value(raw.clone()) {
                    Ok(fan) => fan,
                    Err(e) => {
                        warn!(target: "sc.fans", fan_id = %fan_id, error = %e, "Skipping malformed fan record");
                        continue;
                    }
                };
                fan.order = match self.records.get(&fan_id) {
                    Some(existing) => existing.order,
                    None => {
                        self.next_order += 1;
                        self.next_order
                    }
                };
                fan.fan_id = fan_id.clone();
                next.insert(fan_id, fan);
            }
        }

        let mut removed: Vec<ActiveFan> = previous_in_line
            .iter()
            .filter(|id| !next.get(*id).is_some_and(ActiveFan::is_in_line))
            .filter_map(|id| self.records.get(id).cloned())
            .collect();
        removed.sort_by(|a, b| (a.order, &a.fan_id).cmp(&(b.order, &b.fan_id)));

        let mut added: Vec<&ActiveFan> = next
            .values()
            .filter(|f| f.is_in_line() && !previous_in_line.contains(&f.fan_id))
            .collect();
        added.sort_by(|a, b| (a.order, &a.fan_id).cmp(&(b.order, &b.fan_id)));
        let added = added.into_iter().map(|f| f.fan_id.clone()).collect();

        self.records = next;
        QueueDiff {
            removed,
            added,
            backstage: self.holder(FanSeat::BackstageFan).cloned(),
            on_stage: self.holder(FanSeat::Fan).cloned(),
        }
    }

    #[must_use]
    pub fn get(&self, fan_id: &FanId) -> Option<&ActiveFan> {
        self.records.get(fan_id)
    }

    /// Apply a local change ahead of the store echo.
    pub fn update_local(&mut self, fan_id: &FanId, change: impl FnOnce(&mut ActiveFan)) {
        if let Some(fan) = self.records.get_mut(fan_id) {
            change(fan);
        }
    }

    /// Every record, in queue order.
    #[must_use]
    pub fn ordered(&self) -> Vec<&ActiveFan> {
        let mut fans: Vec<&ActiveFan> = self.records.values().collect();
        fans.sort_by(|a, b| (a.order, &a.fan_id).cmp(&(b.order, &b.fan_id)));
        fans
    }

    /// Fans in line, in queue order.
    #[must_use]
    pub fn in_line(&self) -> Vec<&ActiveFan> {
        self.ordered()
            .into_iter()
            .filter(|f| f.is_in_line())
            .collect()
    }

    /// Current holder of a seat. The last flagged record wins.
    #[must_use]
    pub fn holder(&self, seat: FanSeat) -> Option<&ActiveFan> {
        self.ordered().into_iter().rev().find(|f| match seat {
            FanSeat::BackstageFan => f.is_backstage,
            FanSeat::Fan => f.is_on_stage,
        })
    }

    /// Fan whose backstage stream is `stream_id`.
    #[must_use]
    pub fn by_stream(&self, stream_id: &StreamId) -> Option<&ActiveFan> {
        self.records
            .values()
            .find(|f| f.stream_id.as_ref() == Some(stream_id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Engine {
    /// Producer: react to a new `activeFans` snapshot.
    pub(crate) async fn on_active_fans(&mut self, value: Option<Value>) {
        let diff = self.fans.reconcile(value.as_ref());
        metrics::set_active_fans(self.fans.in_line().len());
        debug!(
            target: "sc.fans",
            added = diff.added.len(),
            removed = diff.removed.len(),
            backstage = ?diff.backstage.as_ref().map(|f| f.fan_id.as_str()),
            on_stage = ?diff.on_stage.as_ref().map(|f| f.fan_id.as_str()),
            "Active fans reconciled"
        );

        if let Some(fan) = &diff.backstage {
            self.participants.set_fan_id(FanSeat::BackstageFan, fan.fan_id.clone());
        }
        if let Some(fan) = &diff.on_stage {
            self.participants.set_fan_id(FanSeat::Fan, fan.fan_id.clone());
        }

        for fan in &diff.removed {
            self.chats.remove(fan.fan_id.as_str());
            self.listeners.detach(&StoreWatch::FanChat(fan.fan_id.clone()));
            if self.call.involves_fan(&fan.fan_id) {
                let report = self.end_private_call().await;
                self.publish_report(report);
            }
        }

        for fan_id in &diff.added {
            let path = self.paths.chat_messages(fan_id.as_str());
            if let Err(e) = self
                .listeners
                .attach(StoreWatch::FanChat(fan_id.clone()), path)
                .await
            {
                warn!(target: "sc.fans", fan_id = %fan_id, error = %e, "Failed to watch fan chat");
            }
        }

        // Keep fan chat recipients in step with seat changes
        for fan in self.fans.in_line() {
            self.chats.retarget(fan.fan_id.as_str(), fan.chat_type());
        }

        self.emit_queue();
    }
}
