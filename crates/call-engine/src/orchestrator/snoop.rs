//! Audio-tap ("snoop") contract state machine
//!
//! A snoop channel is an auxiliary, non-participating channel that captures
//! a leg's audio for analysis. Its lifecycle is governed by an explicit
//! contract: the tap only becomes `Ready` on the control plane's own
//! confirmation that the channel started (never on the creation call
//! returning), and outside call teardown a tap in an active-listening phase
//! must not be destroyed by an unrelated hangup race.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use callflow_control_core::{ChannelInfo, ControlPlane};
use callflow_store_core::KeyValueStore;

use crate::error::Result;

const CONTRACT_PREFIX: &str = "callflow:snoop:contract:";
const PARENT_PREFIX: &str = "callflow:snoop:parent:";

/// Reasons that always permit destruction: a call that is ending must
/// release all its resources regardless of where the tap was in its
/// lifecycle.
const TEARDOWN_REASONS: [&str; 3] = ["hangup", "cleanup", "stasis-end"];

/// Lifecycle state of a tap channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnoopState {
    /// Contract recorded, channel not yet requested
    Created,
    /// Channel requested from the control plane, start not yet confirmed
    WaitingReady,
    /// Start confirmed by the control plane
    Ready,
    /// Joined to the call's capture bridge
    Anchored,
    Destroyed,
}

/// One audio-tap contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnoopContract {
    pub snoop_id: String,
    pub parent_channel_id: String,
    pub linked_id: String,
    pub state: SnoopState,
    pub capture_bridge_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SnoopContract {
    /// Whether cleanup with the given reason may destroy this tap
    ///
    /// Teardown reasons override protective states. Outside teardown, the
    /// only tolerated reason is an explicit timeout, and only a tap that
    /// has not reached an active-listening phase — or is already gone — is
    /// fair game unconditionally.
    pub fn may_destroy(&self, reason: &str) -> bool {
        if TEARDOWN_REASONS.contains(&reason) {
            return true;
        }
        match self.state {
            SnoopState::Created | SnoopState::Destroyed => true,
            SnoopState::WaitingReady | SnoopState::Ready | SnoopState::Anchored => {
                reason == "timeout"
            }
        }
    }
}

/// Store-persisted snoop contract management
#[derive(Clone)]
pub struct SnoopManager {
    store: Arc<dyn KeyValueStore>,
    control: Arc<dyn ControlPlane>,
    ttl: Duration,
    app: String,
}

impl SnoopManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        control: Arc<dyn ControlPlane>,
        ttl: Duration,
        app: String,
    ) -> Self {
        Self {
            store,
            control,
            ttl,
            app,
        }
    }

    pub async fn get(&self, snoop_id: &str) -> Result<Option<SnoopContract>> {
        let key = format!("{}{}", CONTRACT_PREFIX, snoop_id);
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(raw) => match serde_json::from_str::<SnoopContract>(&raw) {
                Ok(contract) => Ok(Some(contract)),
                Err(e) => {
                    tracing::warn!("Dropping undecodable snoop contract {}: {}", key, e);
                    self.store.delete(&key).await?;
                    Ok(None)
                }
            },
        }
    }

    async fn put(&self, contract: &SnoopContract) -> Result<()> {
        let key = format!("{}{}", CONTRACT_PREFIX, contract.snoop_id);
        let raw = serde_json::to_string(contract)?;
        self.store.set(&key, &raw, Some(self.ttl)).await?;
        Ok(())
    }

    /// The tap listening on a given parent channel, if any
    pub async fn for_parent(&self, parent_channel_id: &str) -> Result<Option<SnoopContract>> {
        let key = format!("{}{}", PARENT_PREFIX, parent_channel_id);
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(snoop_id) => self.get(&snoop_id).await,
        }
    }

    /// All contracts belonging to a call
    pub async fn contracts_for_call(&self, linked_id: &str) -> Result<Vec<SnoopContract>> {
        let mut contracts = Vec::new();
        for key in self.store.keys(CONTRACT_PREFIX).await? {
            let snoop_id = &key[CONTRACT_PREFIX.len()..];
            if let Some(contract) = self.get(snoop_id).await? {
                if contract.linked_id == linked_id {
                    contracts.push(contract);
                }
            }
        }
        Ok(contracts)
    }

    /// Request a tap on `parent`
    ///
    /// Records the contract, asks the control plane for the channel, and
    /// moves to `WaitingReady`. The contract does NOT become `Ready` here:
    /// creation can succeed while the channel is still materializing, so
    /// readiness waits for the confirmation event.
    pub async fn request_tap(
        &self,
        parent: &ChannelInfo,
        linked_id: &str,
    ) -> Result<Option<SnoopContract>> {
        let snoop_id = format!("snoop-{}", Uuid::new_v4());
        let mut contract = SnoopContract {
            snoop_id: snoop_id.clone(),
            parent_channel_id: parent.id.clone(),
            linked_id: linked_id.to_string(),
            state: SnoopState::Created,
            capture_bridge_id: None,
            created_at: Utc::now(),
        };
        self.put(&contract).await?;
        self.store
            .set(
                &format!("{}{}", PARENT_PREFIX, parent.id),
                &snoop_id,
                Some(self.ttl),
            )
            .await?;

        match self.control.start_snoop(&parent.id, &snoop_id, &self.app).await {
            Ok(_) => {
                contract.state = SnoopState::WaitingReady;
                self.put(&contract).await?;
                tracing::info!("Requested tap {} on {}", snoop_id, parent.id);
                Ok(Some(contract))
            }
            Err(e) => {
                tracing::warn!("Tap request on {} failed: {}", parent.id, e);
                contract.state = SnoopState::Destroyed;
                self.put(&contract).await?;
                Ok(None)
            }
        }
    }

    /// The control plane confirmed the tap channel started
    ///
    /// This is the single source of truth for readiness. A secondary
    /// verification query is attempted but is advisory only: its failure
    /// must not prevent the transition once the confirmation arrived.
    pub async fn confirm_started(&self, snoop_channel_id: &str) -> Result<()> {
        let Some(mut contract) = self.get(snoop_channel_id).await? else {
            tracing::debug!("Start confirmation for unknown tap {}", snoop_channel_id);
            return Ok(());
        };
        if contract.state != SnoopState::WaitingReady {
            tracing::debug!(
                "Tap {} confirmation in state {:?}, ignoring",
                contract.snoop_id,
                contract.state
            );
            return Ok(());
        }

        if let Err(e) = self.control.get_channel(&contract.snoop_id).await {
            tracing::debug!(
                "Advisory verification of tap {} failed (proceeding): {}",
                contract.snoop_id,
                e
            );
        }

        contract.state = SnoopState::Ready;
        self.put(&contract).await?;
        tracing::info!("Tap {} is ready", contract.snoop_id);

        // Anchor to the call's capture bridge when one exists
        let capture_bridge = format!("capture-{}", contract.linked_id);
        if self.control.bridge_members(&capture_bridge).await.is_ok() {
            match self
                .control
                .add_to_bridge(&capture_bridge, &contract.snoop_id)
                .await
            {
                Ok(()) => {
                    contract.state = SnoopState::Anchored;
                    contract.capture_bridge_id = Some(capture_bridge.clone());
                    self.put(&contract).await?;
                    tracing::info!("Tap {} anchored to {}", contract.snoop_id, capture_bridge);
                }
                Err(e) if e.is_benign() => {}
                Err(e) => {
                    tracing::warn!(
                        "Failed to anchor tap {} to {}: {}",
                        contract.snoop_id,
                        capture_bridge,
                        e
                    );
                }
            }
        }
        Ok(())
    }

    /// Destroy a tap if the contract permits it for this reason
    ///
    /// Returns whether the tap was (or already is) torn down.
    pub async fn destroy(&self, snoop_id: &str, reason: &str) -> Result<bool> {
        let Some(mut contract) = self.get(snoop_id).await? else {
            return Ok(false);
        };
        if contract.state == SnoopState::Destroyed {
            return Ok(true);
        }
        if !contract.may_destroy(reason) {
            tracing::debug!(
                "Tap {} in state {:?} protected from destruction (reason {:?})",
                snoop_id,
                contract.state,
                reason
            );
            return Ok(false);
        }

        if let Err(e) = self.control.hangup(&contract.snoop_id).await {
            if !e.is_benign() {
                tracing::warn!("Failed to hang up tap {}: {}", contract.snoop_id, e);
            }
        }
        contract.state = SnoopState::Destroyed;
        self.put(&contract).await?;
        self.store
            .delete(&format!("{}{}", PARENT_PREFIX, contract.parent_channel_id))
            .await?;
        tracing::info!("Destroyed tap {} (reason {:?})", snoop_id, reason);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(state: SnoopState) -> SnoopContract {
        SnoopContract {
            snoop_id: "snoop-1".to_string(),
            parent_channel_id: "ch-a".to_string(),
            linked_id: "call-1".to_string(),
            state,
            capture_bridge_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn teardown_reasons_override_protective_states() {
        for reason in ["hangup", "cleanup", "stasis-end"] {
            assert!(contract(SnoopState::WaitingReady).may_destroy(reason));
            assert!(contract(SnoopState::Ready).may_destroy(reason));
            assert!(contract(SnoopState::Anchored).may_destroy(reason));
        }
    }

    #[test]
    fn active_phases_resist_opportunistic_destruction() {
        assert!(!contract(SnoopState::Ready).may_destroy("partner-hangup"));
        assert!(!contract(SnoopState::Anchored).may_destroy("race"));
        assert!(contract(SnoopState::Ready).may_destroy("timeout"));
        // Nothing to protect before the channel exists or after it is gone
        assert!(contract(SnoopState::Created).may_destroy("anything"));
        assert!(contract(SnoopState::Destroyed).may_destroy("anything"));
    }
}
