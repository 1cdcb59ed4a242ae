//! Channel correlation
//!
//! Given one channel, find its call partner(s). Three tiers, strict
//! priority order, stopping at the first tier that yields results:
//!
//! 1. the explicit pair relation, looked up in both directions — O(1) and
//!    exact, written by the bridge-join itself;
//! 2. the registered bridge's live member list — tolerates a missing pair
//!    relation (e.g. a crash between bridge-create and pair-write) at the
//!    cost of a control-plane round trip;
//! 3. a full channel-list scan matching the linked id — the expensive last
//!    resort for when the call's own bookkeeping has been lost entirely.

use crate::error::{ok_if_benign, Result};
use crate::orchestrator::core::CallOrchestrator;

impl CallOrchestrator {
    /// Find the partner channel ids of `culprit_channel_id` within the call
    /// identified by `linked_id`
    pub async fn find_partners(
        &self,
        linked_id: &str,
        culprit_channel_id: &str,
    ) -> Result<Vec<String>> {
        // Tier 1: explicit pair relation, both directions
        let mut partners = Vec::new();
        if let Some(partner) = self.registry.partner_as_a(culprit_channel_id).await? {
            partners.push(partner);
        }
        if let Some(partner) = self.registry.partner_as_b(culprit_channel_id).await? {
            if !partners.contains(&partner) {
                partners.push(partner);
            }
        }
        if !partners.is_empty() {
            tracing::debug!(
                "Correlated {} via pair relation: {:?}",
                culprit_channel_id,
                partners
            );
            return Ok(partners);
        }

        // Tier 2: live membership of the registered bridge
        if let Some(session) = self.registry.get_session(linked_id).await? {
            if let Some(bridge_id) = &session.bridge_id {
                if let Some(members) = ok_if_benign(self.bridges.members(bridge_id).await)? {
                    let partners: Vec<String> = members
                        .into_iter()
                        .filter(|id| id != culprit_channel_id)
                        .collect();
                    if !partners.is_empty() {
                        tracing::debug!(
                            "Correlated {} via bridge {}: {:?}",
                            culprit_channel_id,
                            bridge_id,
                            partners
                        );
                        return Ok(partners);
                    }
                }
            }
        }

        // Tier 3: scan everything the control plane knows
        let partners: Vec<String> = self
            .control
            .list_channels()
            .await?
            .into_iter()
            .filter(|info| info.id != culprit_channel_id && info.belongs_to(linked_id))
            .map(|info| info.id)
            .collect();
        if !partners.is_empty() {
            tracing::debug!(
                "Correlated {} via linked-id scan: {:?}",
                culprit_channel_id,
                partners
            );
        } else {
            tracing::debug!("No partners found for {} in call {}", culprit_channel_id, linked_id);
        }
        Ok(partners)
    }
}
