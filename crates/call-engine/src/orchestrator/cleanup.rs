//! Cleanup and cross-leg hangup
//!
//! The only lock-protected path in the engine. Acquiring the per-linked-id
//! lock and failing means another worker is already cleaning this call up;
//! since cleanup is idempotent, the correct move is to return immediately
//! and let the in-flight pass finish — never to block and wait.

use crate::error::Result;
use crate::notify::NotificationKind;
use crate::orchestrator::core::{CallOrchestrator, OrchestratorStats};

/// What a cleanup invocation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// This invocation ran the full pass
    Completed,
    /// Another worker held the lock; nothing was done here
    AlreadyInFlight,
}

impl CallOrchestrator {
    /// Tear down the call identified by `linked_id`
    ///
    /// Hangs up every partner of `culprit_channel_id`, destroys the
    /// registered bridge, and deletes all registry keys for the call.
    /// Concurrent invocations for one linked id result in exactly one full
    /// pass.
    pub async fn cleanup(&self, linked_id: &str, culprit_channel_id: &str) -> Result<CleanupOutcome> {
        let Some(token) = self
            .cleanup_lock
            .acquire(linked_id, self.config.lock_ttl)
            .await?
        else {
            tracing::debug!("Cleanup for {} already in flight, skipping", linked_id);
            OrchestratorStats::bump(&self.stats.cleanups_skipped);
            return Ok(CleanupOutcome::AlreadyInFlight);
        };

        let result = self.cleanup_locked(linked_id, culprit_channel_id).await;

        // Always release; a failed guarded release falls back to an
        // unconditional delete rather than leaving the lock held for its
        // full TTL.
        if let Err(e) = self.cleanup_lock.release(linked_id, &token).await {
            tracing::warn!("Guarded release of cleanup lock {} failed: {}", linked_id, e);
            if let Err(e) = self.cleanup_lock.force_release(linked_id).await {
                tracing::error!("Force release of cleanup lock {} failed: {}", linked_id, e);
            }
        }

        result?;
        OrchestratorStats::bump(&self.stats.cleanups_completed);
        Ok(CleanupOutcome::Completed)
    }

    async fn cleanup_locked(&self, linked_id: &str, culprit_channel_id: &str) -> Result<()> {
        tracing::info!("Cleaning up call {} (culprit {})", linked_id, culprit_channel_id);

        // Cross-leg hangup: find and hang up every partner. A correlation
        // failure degrades to bridge/registry teardown only; the partners'
        // own events will finish the job.
        let partners = match self.find_partners(linked_id, culprit_channel_id).await {
            Ok(partners) => partners,
            Err(e) => {
                tracing::warn!("Partner correlation for {} failed: {}", linked_id, e);
                Vec::new()
            }
        };
        for partner_id in &partners {
            self.hangup_partner(linked_id, partner_id).await;
        }

        // Taps go down with the call; teardown reasons override whatever
        // phase the contract is in.
        match self.snoops.contracts_for_call(linked_id).await {
            Ok(contracts) => {
                for contract in contracts {
                    if let Err(e) = self.snoops.destroy(&contract.snoop_id, "cleanup").await {
                        tracing::warn!("Failed to destroy tap {}: {}", contract.snoop_id, e);
                    }
                }
            }
            Err(e) => tracing::warn!("Could not list taps for {}: {}", linked_id, e),
        }

        // Bridge, then registry keys for the culprit and the session itself
        if let Some(session) = self.registry.get_session(linked_id).await? {
            if let Some(bridge_id) = &session.bridge_id {
                if let Err(e) = self.bridges.destroy(bridge_id).await {
                    tracing::warn!("Bridge {} teardown failed: {}", bridge_id, e);
                }
            }
        }

        self.registry.delete_session(linked_id).await?;
        self.registry.clear_pairs(culprit_channel_id).await?;
        self.registry.delete_active(culprit_channel_id).await?;

        tracing::info!("Cleanup for {} complete ({} partner(s))", linked_id, partners.len());
        Ok(())
    }

    /// Hang up one partner leg: marker-gated notification, hangup command,
    /// registry scrub. Errors are tolerated — a partner we failed to reach
    /// is picked up by its own destroy event or by session expiry.
    async fn hangup_partner(&self, linked_id: &str, partner_id: &str) {
        let answered = match self.registry.get_active(partner_id).await {
            Ok(Some(call)) => call.answered,
            // No snapshot: assume the call was up rather than inventing a
            // cancellation for a leg we know nothing about.
            _ => true,
        };
        let (kind, reason) = if answered {
            (NotificationKind::Hangup, "hangup")
        } else {
            (NotificationKind::Cancelled, "cancelled-before-answer")
        };

        if let Err(e) = self.emit_hangup_once(partner_id, linked_id, kind, reason).await {
            tracing::warn!("Failed to report hangup for partner {}: {}", partner_id, e);
        }
        if let Err(e) = self.control.hangup(partner_id).await {
            if !e.is_benign() {
                tracing::warn!("Failed to hang up partner {}: {}", partner_id, e);
            }
        }
        if let Err(e) = self.registry.clear_pairs(partner_id).await {
            tracing::warn!("Failed to clear pair relations for {}: {}", partner_id, e);
        }
        if let Err(e) = self.registry.delete_active(partner_id).await {
            tracing::warn!("Failed to drop snapshot for {}: {}", partner_id, e);
        }
    }
}
