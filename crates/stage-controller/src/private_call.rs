//! Private Call Arbiter.
//!
//! The producer talks privately with one participant at a time. The call is a
//! single record at `privateCall`; every transition between two calls passes
//! through `null` so observers always see an end before the next start.

use crate::engine::Engine;
use crate::errors::ScError;
use crate::gateway::SubscribeOptions;
use crate::observability::metrics;
use crate::roles::{CallTarget, FanSeat, PrivilegedRole, SessionName, UserRole};
use crate::store::{decode, fields};
use crate::workflow::{Workflow, WorkflowReport};
use common::types::{FanId, StreamId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// The `privateCall` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateCall {
    pub is_with: CallTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_id: Option<FanId>,
}

impl PrivateCall {
    #[must_use]
    pub fn new(is_with: CallTarget, fan_id: Option<FanId>) -> Self {
        Self { is_with, fan_id }
    }
}

/// What a connect request amounts to, given the current call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    Start(PrivateCall),
    /// The request named the current call: hang up.
    End,
    /// Hang up the current call, then start the requested one.
    Switch(PrivateCall),
}

impl CallAction {
    #[must_use]
    pub fn decide(current: Option<&PrivateCall>, requested: PrivateCall) -> Self {
        match current {
            None => CallAction::Start(requested),
            Some(active) if *active == requested => CallAction::End,
            Some(_) => CallAction::Switch(requested),
        }
    }
}

/// Local view of the private call.
#[derive(Debug, Default)]
pub struct PrivateCallArbiter {
    current: Option<PrivateCall>,
    /// Backstage stream subscribed for an `activeFan` call. Kept here because
    /// the fan record may be gone by the time the call ends.
    fan_stream: Option<StreamId>,
}

impl PrivateCallArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Option<&PrivateCall> {
        self.current.as_ref()
    }

    /// Replace the local state. Returns the previous call.
    pub fn set(&mut self, call: Option<PrivateCall>) -> Option<PrivateCall> {
        std::mem::replace(&mut self.current, call)
    }

    pub fn remember_fan_stream(&mut self, stream_id: StreamId) {
        self.fan_stream = Some(stream_id);
    }

    pub fn take_fan_stream(&mut self) -> Option<StreamId> {
        self.fan_stream.take()
    }

    #[must_use]
    pub fn involves_fan(&self, fan_id: &FanId) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.fan_id.as_ref() == Some(fan_id))
    }

    #[must_use]
    pub fn involves_role(&self, role: UserRole) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.is_with.user_role() == Some(role))
    }
}

impl Engine {
    /// Producer: start, end or switch a private call.
    #[instrument(skip_all, name = "sc.private_call.connect", fields(target = %target))]
    pub(crate) async fn connect_private_call(
        &mut self,
        target: CallTarget,
        fan_id: Option<FanId>,
    ) -> Result<WorkflowReport, ScError> {
        self.require_role(PrivilegedRole::Producer, "private call")?;
        // Seated fans can be called by seat alone
        let fan_id = fan_id.or_else(|| {
            let seat = match target {
                CallTarget::Fan => FanSeat::Fan,
                CallTarget::BackstageFan => FanSeat::BackstageFan,
                _ => return None,
            };
            self.fans.holder(seat).map(|f| f.fan_id.clone())
        });
        if target == CallTarget::ActiveFan && fan_id.is_none() {
            return Err(ScError::FanNotFound(format!("{target} call without a fan id")));
        }

        let requested = PrivateCall::new(target, fan_id);
        Ok(match CallAction::decide(self.call.current(), requested) {
            CallAction::Start(call) => self.start_private_call(call).await,
            CallAction::End => self.end_private_call().await,
            CallAction::Switch(call) => {
                let mut report = self.end_private_call().await;
                report.absorb(self.start_private_call(call).await);
                report
            }
        })
    }

    async fn start_private_call(&mut self, call: PrivateCall) -> WorkflowReport {
        let mut wf = Workflow::new("start_private_call");
        let target = call.is_with;

        if let Some(fan_id) = call.fan_id.clone() {
            let result = self.set_fan_flag(&fan_id, "inPrivateCall", true).await;
            wf.step("mark_fan_in_call", result);
            self.fans.update_local(&fan_id, |f| f.in_private_call = true);
            self.chats.set_in_private_call(fan_id.as_str(), true);
        }

        let record = serde_json::to_value(&call).map_err(ScError::from);
        let result = match record {
            Ok(record) => self.store.write(&self.paths.private_call(), record).await,
            Err(e) => Err(e),
        };
        wf.step("write_private_call", result);
        self.call.set(Some(call.clone()));

        let result = self.registry.set_publish_audio(target.session(), true).await;
        wf.step("publish_audio", result);

        let result = self
            .registry
            .set_all_subscribers_audio(SessionName::Stage, false, &[])
            .await;
        wf.step("mute_stage", result);

        let result = self.subscribe_call_target(&call).await;
        wf.step("subscribe_target", result);

        metrics::record_private_call_transition("start");
        info!(target: "sc.private_call", with = %target, fan_id = ?call.fan_id.as_ref().map(FanId::as_str), "Private call started");
        self.emit_call();
        wf.finish()
    }

    /// End the current call. A no-op when there is none.
    pub(crate) async fn end_private_call(&mut self) -> WorkflowReport {
        let Some(call) = self.call.current().cloned() else {
            return WorkflowReport::skipped("end_private_call");
        };
        let mut wf = Workflow::new("end_private_call");

        if let Some(fan_id) = call.fan_id.clone() {
            let result = self.set_fan_flag(&fan_id, "inPrivateCall", false).await;
            wf.step("clear_fan_in_call", result);
            self.fans.update_local(&fan_id, |f| f.in_private_call = false);
            self.chats.set_in_private_call(fan_id.as_str(), false);
        }

        let result = self
            .store
            .write(&self.paths.private_call(), Value::Null)
            .await;
        wf.step("clear_private_call", result);
        self.call.set(None);

        let result = self.unsubscribe_call_target(&call).await;
        wf.step("release_target", result);

        let result = self
            .registry
            .set_publish_audio(call.is_with.session(), false)
            .await;
        wf.step("unpublish_audio", result);

        let result = self
            .registry
            .set_all_subscribers_audio(SessionName::Stage, true, &[])
            .await;
        wf.step("unmute_stage", result);

        metrics::record_private_call_transition("end");
        info!(target: "sc.private_call", with = %call.is_with, "Private call ended");
        self.emit_call();
        wf.finish()
    }

    /// Write a boolean flag on a fan record, if the record still exists.
    pub(crate) async fn set_fan_flag(
        &self,
        fan_id: &FanId,
        flag: &str,
        value: bool,
    ) -> Result<(), ScError> {
        let path = self.paths.active_fan(fan_id);
        if self.store.read(&path).await?.is_none() {
            debug!(target: "sc.private_call", fan_id = %fan_id, "Fan record gone, skipping flag");
            return Ok(());
        }
        self.store
            .update(&path, fields([(flag, Value::Bool(value))]))
            .await
    }

    fn call_fan_stream(&self, call: &PrivateCall) -> Result<StreamId, ScError> {
        let fan_id = call
            .fan_id
            .as_ref()
            .ok_or_else(|| ScError::FanNotFound(format!("{} call without a fan id", call.is_with)))?;
        self.fans
            .get(fan_id)
            .and_then(|f| f.stream_id.clone())
            .ok_or_else(|| ScError::FanNotFound(fan_id.to_string()))
    }

    fn call_role_stream(&self, role: UserRole) -> Result<StreamId, ScError> {
        self.participants
            .get(role)
            .and_then(|s| s.stream.as_ref().map(|r| r.stream_id.clone()))
            .or_else(|| {
                self.registry
                    .camera_stream_for_role(role.session(), role)
                    .map(|s| s.stream_id.clone())
            })
            .ok_or(ScError::ParticipantNotFound(role))
    }

    async fn subscribe_call_target(&mut self, call: &PrivateCall) -> Result<(), ScError> {
        match call.is_with.user_role() {
            None => {
                let stream_id = self.call_fan_stream(call)?;
                self.registry
                    .subscribe(SessionName::Backstage, &stream_id, SubscribeOptions::FULL)
                    .await?;
                self.call.remember_fan_stream(stream_id);
                Ok(())
            }
            Some(role) => {
                let stream_id = self.call_role_stream(role)?;
                self.registry
                    .set_subscriber_audio(role.session(), &stream_id, true)
                    .await
            }
        }
    }

    async fn unsubscribe_call_target(&mut self, call: &PrivateCall) -> Result<(), ScError> {
        match call.is_with {
            CallTarget::ActiveFan => {
                let stream_id = match self.call.take_fan_stream() {
                    Some(stream_id) => stream_id,
                    None => self.call_fan_stream(call)?,
                };
                self.registry
                    .unsubscribe(SessionName::Backstage, &stream_id)
                    .await
            }
            CallTarget::BackstageFan => {
                let stream_id = self.call_role_stream(UserRole::BackstageFan)?;
                self.registry
                    .set_subscriber_audio(SessionName::Backstage, &stream_id, false)
                    .await
            }
            // Stage audio is restored wholesale afterwards
            CallTarget::Host | CallTarget::Celebrity | CallTarget::Fan => Ok(()),
        }
    }

    /// Producer: a host or celebrity presence flag changed.
    pub(crate) async fn on_role_active(&mut self, role: PrivilegedRole, value: Option<Value>) {
        let active = decode::<bool>(&self.paths.role_active(role), value)
            .ok()
            .flatten()
            .unwrap_or(false);
        self.role_active.insert(role, active);
        if !active && self.call.involves_role(role.user_role()) {
            info!(target: "sc.private_call", role = %role, "Call partner left the event, ending call");
            let report = self.end_private_call().await;
            self.publish_report(report);
        }
    }

    /// Host/celebrity: follow the producer's `privateCall` record.
    pub(crate) async fn observe_private_call(&mut self, value: Option<Value>) {
        let update = match decode::<PrivateCall>(&self.paths.private_call(), value) {
            Ok(update) => update,
            Err(e) => {
                warn!(target: "sc.private_call", error = %e, "Ignoring malformed private call record");
                return;
            }
        };
        // Calls with fans off stage are invisible to the stage
        if update
            .as_ref()
            .is_some_and(|c| matches!(c.is_with, CallTarget::ActiveFan | CallTarget::BackstageFan))
        {
            return;
        }
        if self.call.current() == update.as_ref() {
            return;
        }

        if let Some(previous) = self.call.set(None) {
            self.apply_observed_call(&previous, false).await;
        }
        if let Some(call) = update {
            self.apply_observed_call(&call, true).await;
            self.call.set(Some(call));
        }
        self.emit_call();
    }

    /// Host/celebrity: the producer left, so any call with us is over.
    pub(crate) async fn drop_observed_call(&mut self) {
        if let Some(previous) = self.call.set(None) {
            self.apply_observed_call(&previous, false).await;
            self.emit_call();
        }
    }

    async fn apply_observed_call(&mut self, call: &PrivateCall, started: bool) {
        let local = self.settings.role.user_role();
        let producer_stream = self
            .registry
            .camera_stream_for_role(SessionName::Stage, UserRole::Producer)
            .map(|s| s.stream_id.clone());
        let mut wf = Workflow::new(if started {
            "observe_call_start"
        } else {
            "observe_call_end"
        });

        if call.is_with.user_role() == Some(local) {
            // Only the producer is heard during our call
            let result = self
                .registry
                .set_all_subscribers_audio(SessionName::Stage, !started, &[])
                .await;
            wf.step("stage_audio", result);
            if let Some(stream_id) = producer_stream {
                let result = self
                    .registry
                    .set_subscriber_audio(SessionName::Stage, &stream_id, started)
                    .await;
                wf.step("producer_audio", result);
            }
        } else if let Some(role) = call.is_with.user_role().filter(UserRole::is_on_stage) {
            if let Ok(stream_id) = self.call_role_stream(role) {
                let result = self
                    .registry
                    .set_subscriber_audio(SessionName::Stage, &stream_id, !started)
                    .await;
                wf.step("partner_audio", result);
            }
        }
        let report = wf.finish();
        self.publish_report(report);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host_call() -> PrivateCall {
        PrivateCall::new(CallTarget::Host, None)
    }

    fn fan_call(id: &str) -> PrivateCall {
        PrivateCall::new(CallTarget::ActiveFan, Some(FanId::new(id)))
    }

    #[test]
    fn test_decide_start_end_switch() {
        assert_eq!(
            CallAction::decide(None, host_call()),
            CallAction::Start(host_call())
        );
        assert_eq!(
            CallAction::decide(Some(&host_call()), host_call()),
            CallAction::End
        );
        assert_eq!(
            CallAction::decide(Some(&host_call()), fan_call("42")),
            CallAction::Switch(fan_call("42"))
        );
    }

    #[test]
    fn test_same_target_different_fan_switches() {
        assert_eq!(
            CallAction::decide(Some(&fan_call("1")), fan_call("2")),
            CallAction::Switch(fan_call("2"))
        );
    }

    #[test]
    fn test_record_wire_format() {
        let value = serde_json::to_value(fan_call("42")).unwrap();
        assert_eq!(value, json!({"isWith": "activeFan", "fanId": "42"}));
        let value = serde_json::to_value(host_call()).unwrap();
        assert_eq!(value, json!({"isWith": "host"}));
    }

    #[test]
    fn test_fan_stream_is_taken_once() {
        let mut arbiter = PrivateCallArbiter::new();
        arbiter.set(Some(fan_call("7")));
        arbiter.remember_fan_stream(StreamId::new("fan-7"));

        // Ending the call clears the record but not the stream
        arbiter.set(None);
        assert_eq!(arbiter.take_fan_stream(), Some(StreamId::new("fan-7")));
        assert_eq!(arbiter.take_fan_stream(), None);
    }

    #[test]
    fn test_arbiter_involvement() {
        let mut arbiter = PrivateCallArbiter::new();
        assert!(!arbiter.involves_role(UserRole::Host));

        arbiter.set(Some(PrivateCall::new(
            CallTarget::BackstageFan,
            Some(FanId::new("7")),
        )));
        assert!(arbiter.involves_fan(&FanId::new("7")));
        assert!(arbiter.involves_role(UserRole::BackstageFan));
        assert!(!arbiter.involves_fan(&FanId::new("8")));

        let previous = arbiter.set(None);
        assert!(previous.is_some());
        assert!(arbiter.current().is_none());
    }
}
