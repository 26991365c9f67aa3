//! Promotion workflow: waiting line → backstage → stage, and kicks.
//!
//! Each operation is a fixed step sequence run through [`Workflow`]. A step
//! that fails is logged and counted; the rest of the sequence still runs so
//! the store and the sessions converge as far as they can.

use crate::countdown::CountdownKind;
use crate::engine::{ControllerEvent, Engine};
use crate::errors::ScError;
use crate::gateway::{StreamRef, SubscribeOptions};
use crate::observability::metrics;
use crate::participants::DEFAULT_VOLUME;
use crate::roles::{FanSeat, PrivilegedRole, SessionName, UserRole};
use crate::signaling::Signal;
use crate::store::fields;
use crate::workflow::{Workflow, WorkflowReport};
use common::types::{ConnectionId, FanId, StreamId};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

impl Engine {
    /// Producer: move a fan from the line to the backstage seat.
    ///
    /// A fan already flagged backstage is left alone.
    #[instrument(skip_all, name = "sc.promotion.backstage", fields(fan_id = %fan_id))]
    pub(crate) async fn send_to_backstage(
        &mut self,
        fan_id: &FanId,
    ) -> Result<WorkflowReport, ScError> {
        self.require_role(PrivilegedRole::Producer, "send to backstage")?;
        let fan = self
            .fans
            .get(fan_id)
            .cloned()
            .ok_or_else(|| ScError::FanNotFound(fan_id.to_string()))?;
        if fan.is_backstage {
            debug!(target: "sc.promotion", fan_id = %fan_id, "Fan already backstage");
            return Ok(WorkflowReport::skipped("send_to_backstage"));
        }

        let mut wf = Workflow::new("send_to_backstage");
        self.set_fan_transition(true);

        let occupant = self
            .fans
            .holder(FanSeat::BackstageFan)
            .map(|f| f.fan_id.clone())
            .filter(|id| id != fan_id);
        if occupant.is_some() || self.participants.is_connected(UserRole::BackstageFan) {
            wf.absorb(self.kick_seat(FanSeat::BackstageFan).await);
        }

        if fan.in_private_call || self.call.involves_fan(fan_id) {
            wf.absorb(self.end_private_call().await);
        }

        self.chats
            .retarget(fan_id.as_str(), UserRole::BackstageFan.as_str());

        let result = match &fan.stream_id {
            Some(stream_id) => {
                self.registry
                    .subscribe(SessionName::Backstage, stream_id, SubscribeOptions::VIDEO_ONLY)
                    .await
            }
            None => Err(ScError::StreamNotFound(format!("fan {fan_id} has no stream"))),
        };
        wf.step("subscribe_backstage", result);

        if let Some(stream_id) = &fan.stream_id {
            self.participants.mark_connected(
                UserRole::BackstageFan,
                Some(StreamRef {
                    session: SessionName::Backstage,
                    stream_id: stream_id.clone(),
                }),
            );
        }
        self.participants
            .set_fan_id(FanSeat::BackstageFan, fan_id.clone());

        let result = match self.fan_connection(fan_id) {
            Ok(to) => {
                self.registry
                    .signal(SessionName::Backstage, &Signal::JoinBackstage, Some(&to))
                    .await
            }
            Err(e) => Err(e),
        };
        wf.step("signal_join_backstage", result);

        let result = self
            .registry
            .signal(SessionName::Stage, &Signal::NewBackstageFan, None)
            .await;
        wf.step("announce_backstage_fan", result);

        let result = self.set_fan_flag(fan_id, "isBackstage", true).await;
        wf.step("persist_backstage", result);
        self.fans.update_local(fan_id, |f| f.is_backstage = true);

        let result = self
            .store
            .write(
                &self.paths.volume(UserRole::BackstageFan),
                json!(DEFAULT_VOLUME),
            )
            .await;
        wf.step("restore_volume", result);

        self.set_fan_transition(false);
        metrics::record_promotion("backstage");
        info!(target: "sc.promotion", fan_id = %fan_id, "Fan sent to backstage");
        self.emit_queue();
        Ok(wf.finish())
    }

    /// Producer: move the backstage fan on stage.
    ///
    /// Returns once the handoff signals are out; `joinHostNow` follows when
    /// the stage countdown reaches zero.
    #[instrument(skip_all, name = "sc.promotion.stage")]
    pub(crate) async fn send_to_stage(&mut self) -> Result<WorkflowReport, ScError> {
        self.require_role(PrivilegedRole::Producer, "send to stage")?;
        if self.pending_stage_join.is_some() {
            debug!(target: "sc.promotion", "Stage countdown already running, not sending another fan");
            return Ok(WorkflowReport::skipped("send_to_stage"));
        }
        let Some(fan) = self.fans.holder(FanSeat::BackstageFan).cloned() else {
            debug!(target: "sc.promotion", "No backstage fan to send on stage");
            return Ok(WorkflowReport::skipped("send_to_stage"));
        };
        let fan_id = fan.fan_id.clone();

        let mut wf = Workflow::new("send_to_stage");
        self.set_fan_transition(true);

        if let Some(to) = self
            .registry
            .connection_for_role(SessionName::Stage, UserRole::Fan)
        {
            let result = self
                .registry
                .signal(SessionName::Stage, &Signal::Disconnect, Some(&to))
                .await;
            wf.step("disconnect_stage_fan", result);
        }

        if fan.in_private_call || self.call.involves_fan(&fan_id) {
            wf.absorb(self.end_private_call().await);
        }

        self.chats.retarget(fan_id.as_str(), UserRole::Fan.as_str());

        let (result, backstage_conn) = match self.fan_connection(&fan_id) {
            Ok(to) => {
                let result = self
                    .registry
                    .signal(SessionName::Backstage, &Signal::JoinHost, Some(&to))
                    .await;
                (result, Some(to))
            }
            Err(e) => (Err(e), None),
        };
        wf.step("signal_join_host", result);

        let result = match &fan.stream_id {
            Some(stream_id) => {
                self.registry
                    .unsubscribe(SessionName::Backstage, stream_id)
                    .await
            }
            None => Err(ScError::StreamNotFound(format!("fan {fan_id} has no stream"))),
        };
        wf.step("unsubscribe_backstage", result);
        self.participants.mark_disconnected(UserRole::BackstageFan);

        let result = self.persist_on_stage(&fan_id).await;
        wf.step("persist_on_stage", result);
        self.fans.update_local(&fan_id, |f| {
            f.is_on_stage = true;
            f.is_backstage = false;
        });

        let result = self
            .store
            .write(&self.paths.volume(UserRole::Fan), json!(DEFAULT_VOLUME))
            .await;
        wf.step("restore_volume", result);

        self.pending_stage_join = backstage_conn;
        self.countdowns
            .start(CountdownKind::Stage, self.settings.stage_countdown_seconds);

        metrics::record_promotion("stage");
        info!(target: "sc.promotion", fan_id = %fan_id, "Fan sent to stage");
        self.emit_queue();
        Ok(wf.finish())
    }

    /// Stage countdown finished: let the fan in.
    pub(crate) async fn complete_stage_join(&mut self) {
        if let Some(to) = self.pending_stage_join.take() {
            if let Err(e) = self
                .registry
                .signal(SessionName::Backstage, &Signal::JoinHostNow, Some(&to))
                .await
            {
                debug!(target: "sc.promotion", error = %e, "joinHostNow not delivered");
            }
        }
        self.set_fan_transition(false);
    }

    /// Producer: remove the fan holding `seat` from its feed.
    #[instrument(skip_all, name = "sc.promotion.kick", fields(seat = ?seat))]
    pub(crate) async fn kick_fan_from_feed(
        &mut self,
        seat: FanSeat,
    ) -> Result<WorkflowReport, ScError> {
        self.require_role(PrivilegedRole::Producer, "kick fan")?;
        let report = self.kick_seat(seat).await;
        self.emit_queue();
        Ok(report)
    }

    async fn kick_seat(&mut self, seat: FanSeat) -> WorkflowReport {
        let role = seat.user_role();
        let session = role.session();
        let mut wf = Workflow::new("kick_fan");

        let state = self.participants.get(role).cloned();
        let fan_id = state
            .as_ref()
            .and_then(|s| s.fan_id.clone())
            .or_else(|| self.fans.holder(seat).map(|f| f.fan_id.clone()));
        let stream_id: Option<StreamId> = state
            .as_ref()
            .and_then(|s| s.stream.as_ref().map(|r| r.stream_id.clone()))
            .or_else(|| {
                fan_id
                    .as_ref()
                    .and_then(|id| self.fans.get(id))
                    .and_then(|f| f.stream_id.clone())
            });

        match seat {
            FanSeat::Fan => {
                let result = match self.registry.connection_for_role(session, role) {
                    Some(to) => {
                        self.registry
                            .signal(session, &Signal::Disconnect, Some(&to))
                            .await
                    }
                    None => Err(ScError::ParticipantNotFound(role)),
                };
                wf.step("signal_disconnect", result);
            }
            FanSeat::BackstageFan => {
                if let Some(fan_id) = &fan_id {
                    let result = self.set_fan_flag(fan_id, "isBackstage", false).await;
                    wf.step("persist_left_backstage", result);
                    self.fans.update_local(fan_id, |f| f.is_backstage = false);
                }
                let to = stream_id
                    .as_ref()
                    .and_then(|id| self.registry.stream(session, id))
                    .map(|s| s.connection.connection_id.clone());
                let result = match to {
                    Some(to) => {
                        self.registry
                            .signal(session, &Signal::DisconnectBackstage, Some(&to))
                            .await
                    }
                    None => Err(ScError::ParticipantNotFound(role)),
                };
                wf.step("signal_disconnect_backstage", result);
            }
        }

        if let Some(stream_id) = &stream_id {
            let result = self.registry.unsubscribe(session, stream_id).await;
            wf.step("unsubscribe", result);
        }

        let in_call = self.call.involves_role(role)
            || fan_id.as_ref().is_some_and(|id| self.call.involves_fan(id));
        if in_call {
            wf.absorb(self.end_private_call().await);
        }

        self.chats.remove(role.as_str());
        self.participants.mark_disconnected(role);

        metrics::record_promotion("kick");
        info!(target: "sc.promotion", role = %role, fan_id = ?fan_id.as_ref().map(FanId::as_str), "Fan kicked from feed");
        wf.finish()
    }

    /// Producer: drop a fan's backstage connection altogether.
    pub(crate) async fn force_fan_disconnect(&mut self, fan_id: &FanId) -> Result<(), ScError> {
        self.require_role(PrivilegedRole::Producer, "force fan disconnect")?;
        self.set_fan_transition(false);
        let to = self.fan_connection(fan_id)?;
        self.registry
            .force_disconnect(SessionName::Backstage, &to)
            .await?;
        info!(target: "sc.promotion", fan_id = %fan_id, "Fan forced to disconnect");
        Ok(())
    }

    /// Backstage connection of a fan in the queue.
    fn fan_connection(&self, fan_id: &FanId) -> Result<ConnectionId, ScError> {
        let stream_id = self
            .fans
            .get(fan_id)
            .and_then(|f| f.stream_id.clone())
            .ok_or_else(|| ScError::FanNotFound(fan_id.to_string()))?;
        self.registry
            .stream(SessionName::Backstage, &stream_id)
            .map(|s| s.connection.connection_id.clone())
            .ok_or_else(|| ScError::StreamNotFound(stream_id.to_string()))
    }

    async fn persist_on_stage(&self, fan_id: &FanId) -> Result<(), ScError> {
        let path = self.paths.active_fan(fan_id);
        if self.store.read(&path).await?.is_none() {
            return Ok(());
        }
        self.store
            .update(
                &path,
                fields([
                    ("isOnStage", Value::Bool(true)),
                    ("isBackstage", Value::Bool(false)),
                ]),
            )
            .await
    }

    pub(crate) fn set_fan_transition(&mut self, active: bool) {
        if self.fan_transition != active {
            self.fan_transition = active;
            self.emit(ControllerEvent::FanTransition { active });
        }
    }
}
