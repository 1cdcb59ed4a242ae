//! Origination timeout guard
//!
//! Every originated destination leg gets a timer for
//! `origination_timeout + ring_guard`. Cancellation is cooperative and
//! best-effort: the fire path re-reads live channel state before acting, so
//! a cancel that loses the race is harmless. Timers are process-local owned
//! tasks with explicit cancellation handles; the re-check is what makes a
//! stale or duplicated timer safe.

use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use callflow_control_core::ChannelState;

use crate::notify::NotificationKind;
use crate::orchestrator::core::{CallOrchestrator, OrchestratorStats};

/// Registry of armed origination timers, keyed by linked id
pub struct OriginationGuard {
    timers: DashMap<String, JoinHandle<()>>,
}

impl OriginationGuard {
    pub fn new() -> Self {
        Self {
            timers: DashMap::new(),
        }
    }

    /// Arm (or re-arm) the guard for a call
    ///
    /// Holds only a weak reference to the orchestrator so an armed timer
    /// never keeps a shut-down engine alive.
    pub fn arm(&self, linked_id: &str, deadline: Duration, orchestrator: Weak<CallOrchestrator>) {
        if let Some((_, stale)) = self.timers.remove(linked_id) {
            stale.abort();
        }
        let linked = linked_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if let Some(orchestrator) = orchestrator.upgrade() {
                orchestrator.origination_guard_fired(&linked).await;
            }
        });
        tracing::debug!("Armed origination guard for {} ({:?})", linked_id, deadline);
        self.timers.insert(linked_id.to_string(), handle);
    }

    /// Best-effort cancel; returns whether a timer was armed
    pub fn cancel(&self, linked_id: &str) -> bool {
        if let Some((_, handle)) = self.timers.remove(linked_id) {
            handle.abort();
            tracing::debug!("Cancelled origination guard for {}", linked_id);
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self, linked_id: &str) -> bool {
        self.timers.contains_key(linked_id)
    }

    fn disarm(&self, linked_id: &str) {
        self.timers.remove(linked_id);
    }
}

impl CallOrchestrator {
    /// The guard fired: force teardown unless the call connected
    ///
    /// Cancellation and firing can race, so the first step re-reads the
    /// current state of every channel sharing the linked id; any leg at
    /// `Up` means the call connected concurrently and nothing happens.
    pub(crate) async fn origination_guard_fired(&self, linked_id: &str) {
        self.guard.disarm(linked_id);
        OrchestratorStats::bump(&self.stats.guards_fired);

        let legs = match self.control.list_channels().await {
            Ok(channels) => channels
                .into_iter()
                .filter(|info| info.belongs_to(linked_id))
                .collect::<Vec<_>>(),
            Err(e) => {
                // Abandon this pass; the next event or the session TTL
                // reconciles whatever is left.
                tracing::warn!(
                    "Guard for {} could not read channel state: {}",
                    linked_id,
                    e
                );
                return;
            }
        };

        if legs.iter().any(|info| info.state.is_up()) {
            tracing::debug!(
                "Guard for {} found an answered leg, call connected concurrently",
                linked_id
            );
            return;
        }

        tracing::info!(
            "Origination guard fired for {}: {} unanswered leg(s)",
            linked_id,
            legs.len()
        );

        for leg in &legs {
            if leg.state == ChannelState::Up {
                continue;
            }
            if let Err(e) = self
                .emit_hangup_once(&leg.id, linked_id, NotificationKind::Hangup, "timeout")
                .await
            {
                tracing::warn!("Failed to report timeout for {}: {}", leg.id, e);
            }
            if let Err(e) = self.control.hangup(&leg.id).await {
                if !e.is_benign() {
                    tracing::warn!("Failed to hang up timed-out leg {}: {}", leg.id, e);
                }
            }
        }

        // Culprit for partner exclusion: the recorded A-leg when we still
        // have one, otherwise the linked id itself.
        let culprit = match self.registry.get_session(linked_id).await {
            Ok(Some(session)) => session
                .a_leg()
                .map(|leg| leg.channel_id.clone())
                .unwrap_or_else(|| linked_id.to_string()),
            _ => linked_id.to_string(),
        };
        if let Err(e) = self.cleanup(linked_id, &culprit).await {
            tracing::warn!("Guard-driven cleanup for {} failed: {}", linked_id, e);
        }
    }
}
