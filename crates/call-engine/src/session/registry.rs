//! Store-backed session registry
//!
//! All call bookkeeping lives in the shared store so that event handlers
//! for one call can run concurrently from independent workers (and
//! independent processes). Every record carries a TTL refreshed on
//! activity; expiry is the backstop against leaks from missed teardown
//! events. Read-modify-write here is deliberately unlocked: registry
//! writes are idempotent, and only cleanup needs stronger serialization.

use std::sync::Arc;
use std::time::Duration;

use callflow_store_core::KeyValueStore;

use crate::error::Result;
use crate::session::types::{ActiveCall, CallSession};

const SESSION_PREFIX: &str = "callflow:session:";
const PAIR_A_PREFIX: &str = "callflow:pair:a:";
const PAIR_B_PREFIX: &str = "callflow:pair:b:";
const ACTIVE_PREFIX: &str = "callflow:active:";
const MARKER_PREFIX: &str = "callflow:hangup-mark:";
const RECORDING_PREFIX: &str = "callflow:recording:";

/// Read/write access to call-session records
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn KeyValueStore>,
    session_ttl: Duration,
    marker_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, session_ttl: Duration, marker_ttl: Duration) -> Self {
        Self {
            store,
            session_ttl,
            marker_ttl,
        }
    }

    // ===== Call sessions =====

    /// Load the session for a linked id
    ///
    /// A record that fails to decode is dropped and reported as absent: a
    /// corrupt entry must never wedge cleanup, and a later event re-creates
    /// whatever is still needed.
    pub async fn get_session(&self, linked_id: &str) -> Result<Option<CallSession>> {
        let key = format!("{}{}", SESSION_PREFIX, linked_id);
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(raw) => match serde_json::from_str::<CallSession>(&raw) {
                Ok(session) => Ok(Some(session)),
                Err(e) => {
                    tracing::warn!("Dropping undecodable session record {}: {}", key, e);
                    self.store.delete(&key).await?;
                    Ok(None)
                }
            },
        }
    }

    /// Write a session record, refreshing its TTL
    pub async fn put_session(&self, session: &CallSession) -> Result<()> {
        let key = format!("{}{}", SESSION_PREFIX, session.linked_id);
        let raw = serde_json::to_string(session)?;
        self.store.set(&key, &raw, Some(self.session_ttl)).await?;
        tracing::debug!("Stored session {} with {} legs", session.linked_id, session.legs.len());
        Ok(())
    }

    pub async fn delete_session(&self, linked_id: &str) -> Result<()> {
        let key = format!("{}{}", SESSION_PREFIX, linked_id);
        self.store.delete(&key).await?;
        Ok(())
    }

    /// Load-or-create, mutate, store
    pub async fn update_session<F>(&self, linked_id: &str, mutate: F) -> Result<CallSession>
    where
        F: FnOnce(&mut CallSession),
    {
        let mut session = self
            .get_session(linked_id)
            .await?
            .unwrap_or_else(|| CallSession::new(linked_id));
        mutate(&mut session);
        self.put_session(&session).await?;
        Ok(session)
    }

    /// Register a bridge on the session; first write wins
    ///
    /// Returns `false` when a different bridge is already attached (at most
    /// one active bridge per linked id).
    pub async fn attach_bridge(&self, linked_id: &str, bridge_id: &str) -> Result<bool> {
        let mut attached = true;
        self.update_session(linked_id, |session| match &session.bridge_id {
            None => session.bridge_id = Some(bridge_id.to_string()),
            Some(existing) if existing == bridge_id => {}
            Some(existing) => {
                tracing::warn!(
                    "Refusing second bridge {} for call {}: {} already active",
                    bridge_id,
                    linked_id,
                    existing
                );
                attached = false;
            }
        })
        .await?;
        Ok(attached)
    }

    pub async fn attach_recording(&self, linked_id: &str, handle: &str) -> Result<()> {
        self.update_session(linked_id, |session| {
            if session.recording_handle.is_none() {
                session.recording_handle = Some(handle.to_string());
            }
        })
        .await?;
        Ok(())
    }

    // ===== Explicit pair relations =====

    /// Record the A-leg ↔ B-leg relation, both directions
    pub async fn write_pair(&self, a_leg_id: &str, b_leg_id: &str) -> Result<()> {
        let ttl = Some(self.session_ttl);
        self.store
            .set(&format!("{}{}", PAIR_A_PREFIX, a_leg_id), b_leg_id, ttl)
            .await?;
        self.store
            .set(&format!("{}{}", PAIR_B_PREFIX, b_leg_id), a_leg_id, ttl)
            .await?;
        tracing::debug!("Recorded pair relation {} <-> {}", a_leg_id, b_leg_id);
        Ok(())
    }

    /// Partner of this channel when it is the A-leg
    pub async fn partner_as_a(&self, channel_id: &str) -> Result<Option<String>> {
        self.store
            .get(&format!("{}{}", PAIR_A_PREFIX, channel_id))
            .await
            .map_err(Into::into)
    }

    /// Partner of this channel when it is the B-leg
    pub async fn partner_as_b(&self, channel_id: &str) -> Result<Option<String>> {
        self.store
            .get(&format!("{}{}", PAIR_B_PREFIX, channel_id))
            .await
            .map_err(Into::into)
    }

    /// Remove every pair relation this channel participates in
    pub async fn clear_pairs(&self, channel_id: &str) -> Result<()> {
        if let Some(partner) = self.partner_as_a(channel_id).await? {
            self.store
                .delete(&format!("{}{}", PAIR_B_PREFIX, partner))
                .await?;
        }
        if let Some(partner) = self.partner_as_b(channel_id).await? {
            self.store
                .delete(&format!("{}{}", PAIR_A_PREFIX, partner))
                .await?;
        }
        self.store
            .delete(&format!("{}{}", PAIR_A_PREFIX, channel_id))
            .await?;
        self.store
            .delete(&format!("{}{}", PAIR_B_PREFIX, channel_id))
            .await?;
        Ok(())
    }

    // ===== Active-call snapshots =====

    pub async fn put_active(&self, call: &ActiveCall) -> Result<()> {
        let key = format!("{}{}", ACTIVE_PREFIX, call.channel.channel_id);
        let raw = serde_json::to_string(call)?;
        self.store.set(&key, &raw, Some(self.session_ttl)).await?;
        Ok(())
    }

    pub async fn get_active(&self, channel_id: &str) -> Result<Option<ActiveCall>> {
        let key = format!("{}{}", ACTIVE_PREFIX, channel_id);
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(raw) => match serde_json::from_str::<ActiveCall>(&raw) {
                Ok(call) => Ok(Some(call)),
                Err(e) => {
                    tracing::warn!("Dropping undecodable active-call snapshot {}: {}", key, e);
                    self.store.delete(&key).await?;
                    Ok(None)
                }
            },
        }
    }

    pub async fn delete_active(&self, channel_id: &str) -> Result<()> {
        self.store
            .delete(&format!("{}{}", ACTIVE_PREFIX, channel_id))
            .await?;
        Ok(())
    }

    /// Record that a leg reached `Up`; sticky across later state changes
    pub async fn mark_answered(&self, channel_id: &str) -> Result<()> {
        if let Some(mut call) = self.get_active(channel_id).await? {
            call.answered = true;
            call.channel.state = callflow_control_core::ChannelState::Up;
            self.put_active(&call).await?;
        }
        Ok(())
    }

    // ===== Hangup idempotency markers =====

    /// Claim the right to emit the hangup-family notification for a channel
    ///
    /// Atomic set-if-absent: exactly one of any number of racing callers
    /// gets `true` within the marker TTL.
    pub async fn mark_hangup_once(&self, channel_id: &str) -> Result<bool> {
        let key = format!("{}{}", MARKER_PREFIX, channel_id);
        let won = self
            .store
            .set_if_absent(&key, "emitted", Some(self.marker_ttl))
            .await?;
        Ok(won)
    }

    // ===== Recording paths =====

    /// Append a finished recording's final path to the call's record
    pub async fn record_recording_path(&self, linked_id: &str, path: &str) -> Result<()> {
        let key = format!("{}{}", RECORDING_PREFIX, linked_id);
        self.store.push(&key, path).await?;
        Ok(())
    }

    pub async fn recording_paths(&self, linked_id: &str) -> Result<Vec<String>> {
        let key = format!("{}{}", RECORDING_PREFIX, linked_id);
        self.store.range(&key).await.map_err(Into::into)
    }
}
