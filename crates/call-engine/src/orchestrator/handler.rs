//! Event dispatch
//!
//! One canonical handler per event kind, routed by call mode and leg role.
//! Handlers are invoked concurrently from independent workers; nothing here
//! assumes event ordering across the legs of a call, and every externally
//! visible hangup notification funnels through the idempotency markers.

use callflow_control_core::{ChannelInfo, ChannelState, ControlEvent};

use crate::admission::admit_internal_call;
use crate::agent::AgentContext;
use crate::error::{ok_if_benign, EngineError, Result};
use crate::notify::{CallNotification, NotificationKind};
use crate::orchestrator::core::{CallOrchestrator, OrchestratorStats};
use crate::session::{ActiveCall, CallArgs, CallMode, ChannelRef, LegRole};

impl CallOrchestrator {
    /// Route one control-plane event
    pub async fn handle_event(&self, event: ControlEvent) -> Result<()> {
        tracing::debug!("Handling {} event", event.kind());
        OrchestratorStats::bump(&self.stats.events_processed);

        match event {
            ControlEvent::SessionStart { channel, app, args } => {
                self.handle_session_start(channel, &app, &args).await
            }
            ControlEvent::SessionEnd { channel_id, app } => {
                self.handle_session_end(&channel_id, &app).await
            }
            ControlEvent::StateChange { channel_id, state } => {
                self.handle_state_change(&channel_id, state).await
            }
            ControlEvent::HangupRequest { channel_id } => {
                self.handle_hangup_request(&channel_id).await
            }
            ControlEvent::ChannelDestroyed { channel_id } => {
                self.handle_channel_destroyed(&channel_id).await
            }
            ControlEvent::LeftBridge {
                channel_id,
                bridge_id,
            } => self.handle_left_bridge(&channel_id, &bridge_id).await,
            ControlEvent::Connected => {
                tracing::info!("Control plane connected");
                Ok(())
            }
            ControlEvent::Disconnected => {
                tracing::warn!("Control plane disconnected");
                Ok(())
            }
            ControlEvent::Reconnecting { attempt } => {
                tracing::warn!("Control plane reconnecting (attempt {})", attempt);
                Ok(())
            }
            ControlEvent::MaxRetriesExceeded => {
                tracing::error!("Control plane reconnection exhausted, refusing to run degraded");
                Err(EngineError::ConnectionLost)
            }
        }
    }

    // ===== session-start =====

    async fn handle_session_start(
        &self,
        channel: ChannelInfo,
        app: &str,
        args: &[String],
    ) -> Result<()> {
        // The snoop application's session-start IS the start confirmation
        // for a tap channel
        if app == self.config.snoop_app_name {
            return self.snoops.confirm_started(&channel.id).await;
        }

        let parsed = CallArgs::parse(args, &self.agent_modes());
        let ani = parsed.ani.clone().unwrap_or_else(|| channel.ani.clone());
        let dnis = parsed.dnis.clone().unwrap_or_else(|| channel.dnis.clone());
        let linked_id = channel.linked_or_own_id().to_string();

        tracing::info!(
            "Session start for {} ({} -> {}) in mode {:?}",
            channel.id,
            ani,
            dnis,
            parsed.mode
        );

        match parsed.mode {
            CallMode::Internal => self.handle_internal(channel, &ani, &dnis, &linked_id).await,
            CallMode::Bridge => {
                // Parser guarantees the id is present for Bridge mode
                let bridge_id = parsed
                    .bridge_id
                    .ok_or_else(|| EngineError::Internal("bridge mode without id".into()))?;
                self.handle_bridge_join(channel, &bridge_id, &linked_id).await
            }
            CallMode::Agent(mode) => {
                self.handle_agent(channel, &mode, &ani, &dnis, &linked_id).await
            }
            CallMode::Unknown => {
                tracing::warn!("Unroutable session-start for {}, answering and hanging up", channel.id);
                ok_if_benign(self.control.answer(&channel.id).await)?;
                ok_if_benign(self.control.hangup(&channel.id).await)?;
                Ok(())
            }
        }
    }

    /// Extension-to-extension call: gate, bridge, originate, guard
    async fn handle_internal(
        &self,
        channel: ChannelInfo,
        ani: &str,
        dnis: &str,
        linked_id: &str,
    ) -> Result<()> {
        if !admit_internal_call(self.admission.as_ref(), ani).await? {
            tracing::info!("Admission denied for {} -> {}", ani, dnis);
            ok_if_benign(self.control.answer(&channel.id).await)?;
            let rejected = CallNotification::new(NotificationKind::Rejected, &channel.id, linked_id)
                .with_party(ani, dnis, LegRole::ALeg.direction())
                .with_reason("admission-denied");
            self.emit(rejected).await;
            ok_if_benign(self.control.hangup(&channel.id).await)?;
            return Ok(());
        }

        self.control.answer(&channel.id).await?;

        let bridge_id = format!("bridge-{}", linked_id);
        self.bridges.ensure(&bridge_id).await?;
        self.bridges.add_channel(&bridge_id, &channel.id).await?;

        // Register the A-leg before the destination exists, so a crash
        // between here and the originate still leaves a correlatable call
        let a_leg = ChannelRef::from_info(&channel, LegRole::ALeg);
        self.registry
            .update_session(linked_id, |session| session.upsert_leg(a_leg.clone()))
            .await?;
        self.registry.attach_bridge(linked_id, &bridge_id).await?;
        self.registry
            .put_active(&ActiveCall::new(a_leg, linked_id))
            .await?;

        let params = callflow_control_core::OriginateParams {
            endpoint: format!("{}/{}", self.config.endpoint_tech, dnis),
            context: self.config.dial_context.clone(),
            caller_id: ani.to_string(),
            timeout_secs: self.config.origination_timeout.as_secs(),
            app_args: vec![
                "bridge".to_string(),
                format!("bridge={}", bridge_id),
                format!("ani={}", ani),
                format!("dnis={}", dnis),
            ],
            linked_id: Some(linked_id.to_string()),
        };
        let b_channel = match self.control.originate(params).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Origination toward {} failed: {}", dnis, e);
                self.emit_hangup_once(&channel.id, linked_id, NotificationKind::Hangup, "no-route")
                    .await?;
                if let Err(e) = self.control.hangup(&channel.id).await {
                    if !e.is_benign() {
                        tracing::warn!("Failed to hang up {}: {}", channel.id, e);
                    }
                }
                self.cleanup(linked_id, &channel.id).await?;
                return Ok(());
            }
        };

        let b_leg = ChannelRef::from_info(&b_channel, LegRole::BLeg);
        self.registry
            .update_session(linked_id, |session| session.upsert_leg(b_leg.clone()))
            .await?;
        self.registry
            .put_active(&ActiveCall::new(b_leg, linked_id))
            .await?;

        self.guard
            .arm(linked_id, self.config.guard_deadline(), self.weak_self());

        let ringing = CallNotification::new(NotificationKind::Ringing, &b_channel.id, linked_id)
            .with_party(ani, dnis, LegRole::BLeg.direction())
            .with_state(ChannelState::Ringing.to_string());
        self.emit(ringing).await;
        Ok(())
    }

    /// Destination leg joining the named bridge
    async fn handle_bridge_join(
        &self,
        channel: ChannelInfo,
        bridge_id: &str,
        linked_id: &str,
    ) -> Result<()> {
        self.control.answer(&channel.id).await?;
        self.bridges.add_channel(bridge_id, &channel.id).await?;

        // The join completes the explicit pair relation: this is the
        // highest-confidence correlation source and must exist before any
        // weaker source is trusted
        let session = self.registry.get_session(linked_id).await?;
        match session.as_ref().and_then(|s| s.a_leg()) {
            Some(a_leg) => {
                self.registry.write_pair(&a_leg.channel_id, &channel.id).await?;
            }
            None => {
                tracing::warn!(
                    "No recorded originating leg for {} at bridge join of {}",
                    linked_id,
                    channel.id
                );
            }
        }

        let b_leg = ChannelRef::from_info(&channel, LegRole::BLeg);
        self.registry
            .update_session(linked_id, |session| session.upsert_leg(b_leg.clone()))
            .await?;
        self.registry.attach_bridge(linked_id, bridge_id).await?;
        self.registry
            .put_active(&ActiveCall::new(b_leg, linked_id))
            .await?;
        Ok(())
    }

    /// Hand the channel to a registered voice agent
    async fn handle_agent(
        &self,
        channel: ChannelInfo,
        mode: &str,
        ani: &str,
        dnis: &str,
        linked_id: &str,
    ) -> Result<()> {
        self.control.answer(&channel.id).await?;

        let leg = ChannelRef::from_info(&channel, LegRole::ALeg);
        self.registry
            .update_session(linked_id, |session| session.upsert_leg(leg.clone()))
            .await?;
        self.registry
            .put_active(&ActiveCall::new(leg, linked_id))
            .await?;

        if self.config.capture_audio {
            self.snoops.request_tap(&channel, linked_id).await?;
        }

        // Protective delay: call setup latency must not be misclassified
        // as caller silence by the agent
        tokio::time::sleep(self.config.agent_connect_delay).await;

        let agent = self.agents.get(mode).map(|entry| entry.value().clone());
        match agent {
            Some(agent) => {
                let ctx = AgentContext {
                    control: self.control.clone(),
                    channel,
                    ani: ani.to_string(),
                    dnis: dnis.to_string(),
                    linked_id: linked_id.to_string(),
                    mode: mode.to_string(),
                    context: self.config.dial_context.clone(),
                };
                if let Err(e) = agent.handle(ctx).await {
                    tracing::error!("Voice agent for mode {:?} failed: {}", mode, e);
                }
            }
            None => {
                tracing::warn!("Voice agent for mode {:?} vanished, hanging up", mode);
                ok_if_benign(self.control.hangup(&channel.id).await)?;
            }
        }
        Ok(())
    }

    // ===== session-end =====

    async fn handle_session_end(&self, channel_id: &str, app: &str) -> Result<()> {
        if app == self.config.snoop_app_name {
            self.snoops.destroy(channel_id, "stasis-end").await?;
            return Ok(());
        }
        // Leaving the main application is a teardown signal in its own
        // right: run cleanup even if hangup/destroyed events were lost
        let linked_id = self.resolve_linked_id(channel_id).await;
        self.cleanup(&linked_id, channel_id).await?;
        Ok(())
    }

    // ===== state-change =====

    async fn handle_state_change(&self, channel_id: &str, state: ChannelState) -> Result<()> {
        let snapshot = self.registry.get_active(channel_id).await?;
        let linked_id = match &snapshot {
            Some(call) => call.linked_id.clone(),
            None => self.resolve_linked_id(channel_id).await,
        };

        if state.is_up() {
            if self.guard.cancel(&linked_id) {
                OrchestratorStats::bump(&self.stats.guards_cancelled);
            }

            self.attach_recording_once(&linked_id, channel_id).await;

            // Synchronize the registry entry and refresh the call's TTL;
            // a channel without a session is not ours to bookkeep
            if let Some(mut session) = self.registry.get_session(&linked_id).await? {
                if let Some(leg) = session.legs.iter_mut().find(|l| l.channel_id == channel_id) {
                    leg.state = ChannelState::Up;
                }
                self.registry.put_session(&session).await?;
            }

            let first_answer = snapshot.as_ref().map(|s| !s.answered).unwrap_or(false);
            self.registry.mark_answered(channel_id).await?;
            if first_answer {
                let notification = self
                    .notification_for(NotificationKind::State, channel_id, &linked_id)
                    .await
                    .with_state(ChannelState::Up.to_string());
                self.emit(notification).await;
            }
            return Ok(());
        }

        if state.is_terminal_failure() {
            let reason = match state {
                ChannelState::Busy => "busy",
                ChannelState::Congestion => "congestion",
                ChannelState::Failed => "no-route",
                _ => "down",
            };
            tracing::info!("Channel {} failed with {} ({})", channel_id, state, reason);
            self.emit_hangup_once(channel_id, &linked_id, NotificationKind::Hangup, reason)
                .await?;
            self.cleanup(&linked_id, channel_id).await?;
            return Ok(());
        }

        // Early states: keep the bookkeeping current
        if let Some(mut call) = snapshot {
            call.channel.state = state;
            self.registry.put_active(&call).await?;
        }
        if let Some(mut session) = self.registry.get_session(&linked_id).await? {
            if let Some(leg) = session.legs.iter_mut().find(|l| l.channel_id == channel_id) {
                leg.state = state;
                self.registry.put_session(&session).await?;
            }
        }
        Ok(())
    }

    /// Start the call's recording on first answer; later answers refresh
    /// nothing (one recording per call)
    async fn attach_recording_once(&self, linked_id: &str, channel_id: &str) {
        let session = match self.registry.get_session(linked_id).await {
            Ok(Some(session)) => session,
            _ => return,
        };
        if session.recording_handle.is_some() {
            return;
        }
        let name = format!("rec-{}", linked_id);
        match self.control.start_recording(channel_id, &name).await {
            Ok(handle) => {
                if let Err(e) = self.registry.attach_recording(linked_id, &handle).await {
                    tracing::warn!("Failed to attach recording {} to {}: {}", handle, linked_id, e);
                }
            }
            Err(e) if e.is_benign() => {}
            Err(e) => tracing::warn!("Failed to start recording for {}: {}", linked_id, e),
        }
    }

    // ===== hangup-request =====

    async fn handle_hangup_request(&self, channel_id: &str) -> Result<()> {
        let linked_id = self.resolve_linked_id(channel_id).await;

        // Role comes from the explicit pair relation: the A-leg is the side
        // that owns a recorded B-leg partner
        if self.registry.partner_as_a(channel_id).await?.is_some() {
            tracing::info!("Hangup request from A-leg {}", channel_id);
            self.emit_channel_end(channel_id, &linked_id).await?;
            self.cleanup(&linked_id, channel_id).await?;
            return Ok(());
        }
        if self.registry.partner_as_b(channel_id).await?.is_some() {
            // The control plane tears the A-leg side down naturally; only
            // report
            tracing::info!("Hangup request from B-leg {}", channel_id);
            self.emit_channel_end(channel_id, &linked_id).await?;
            return Ok(());
        }

        tracing::info!("Hangup request from {} with unknown role, cleaning up defensively", channel_id);
        self.emit_channel_end(channel_id, &linked_id).await?;
        self.cleanup(&linked_id, channel_id).await?;
        Ok(())
    }

    /// Marker-gated end-of-leg notification, kind chosen by answer state
    async fn emit_channel_end(&self, channel_id: &str, linked_id: &str) -> Result<bool> {
        let answered = match self.registry.get_active(channel_id).await? {
            Some(call) => call.answered,
            None => true,
        };
        if answered {
            self.emit_hangup_once(channel_id, linked_id, NotificationKind::Hangup, "hangup")
                .await
        } else {
            self.emit_hangup_once(
                channel_id,
                linked_id,
                NotificationKind::Cancelled,
                "cancelled-before-answer",
            )
            .await
        }
    }

    // ===== channel-destroyed =====

    async fn handle_channel_destroyed(&self, channel_id: &str) -> Result<()> {
        // A dying tap is the snoop machine's business, not a call teardown
        if self.snoops.get(channel_id).await?.is_some() {
            self.snoops.destroy(channel_id, "hangup").await?;
            return Ok(());
        }

        let linked_id = self.resolve_linked_id(channel_id).await;
        tracing::info!("Channel {} destroyed (call {})", channel_id, linked_id);

        self.finish_recording(&linked_id).await;
        self.emit_channel_end(channel_id, &linked_id).await?;
        self.cleanup(&linked_id, channel_id).await?;
        Ok(())
    }

    /// Stop the call's recording and record its final path
    async fn finish_recording(&self, linked_id: &str) {
        let session = match self.registry.get_session(linked_id).await {
            Ok(Some(session)) => session,
            _ => return,
        };
        let Some(handle) = session.recording_handle else {
            return;
        };
        match self.control.stop_recording(&handle).await {
            Ok(Some(path)) => {
                tracing::info!("Recording for {} finished at {}", linked_id, path);
                if let Err(e) = self.registry.record_recording_path(linked_id, &path).await {
                    tracing::warn!("Failed to record final path for {}: {}", linked_id, e);
                }
            }
            Ok(None) => {}
            Err(e) if e.is_benign() => {}
            Err(e) => tracing::warn!("Failed to stop recording for {}: {}", linked_id, e),
        }
    }

    // ===== left-bridge =====

    async fn handle_left_bridge(&self, channel_id: &str, bridge_id: &str) -> Result<()> {
        // Only a known A-leg leaving triggers the fast path: hang the B-leg
        // up immediately instead of waiting for its hangup-request, and drop
        // the bridge. Registry teardown stays with the explicit teardown
        // events.
        let Some(partner_id) = self.registry.partner_as_a(channel_id).await? else {
            tracing::debug!("{} left bridge {} without a recorded partner", channel_id, bridge_id);
            return Ok(());
        };

        tracing::info!(
            "A-leg {} left bridge {}, forcing partner {} down",
            channel_id,
            bridge_id,
            partner_id
        );
        let linked_id = self.resolve_linked_id(channel_id).await;
        let answered = match self.registry.get_active(&partner_id).await? {
            Some(call) => call.answered,
            None => true,
        };
        let (kind, reason) = if answered {
            (NotificationKind::Hangup, "hangup")
        } else {
            (NotificationKind::Cancelled, "cancelled-before-answer")
        };
        self.emit_hangup_once(&partner_id, &linked_id, kind, reason).await?;
        if let Err(e) = self.control.hangup(&partner_id).await {
            if !e.is_benign() {
                tracing::warn!("Failed to hang up partner {}: {}", partner_id, e);
            }
        }
        self.bridges.destroy(bridge_id).await?;
        Ok(())
    }
}
