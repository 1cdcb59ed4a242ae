//! Session record types
//!
//! One [`CallSession`] per logical call, keyed by linked id; one
//! [`ChannelRef`] per telephony channel. Roles are append-only facts: a role
//! is assigned as soon as it is known and never re-derived afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use callflow_control_core::{ChannelInfo, ChannelState};

/// Role of one leg within a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegRole {
    /// Originating leg
    ALeg,
    /// Destination leg
    BLeg,
    /// Auxiliary audio tap
    Snoop,
    Unknown,
}

impl LegRole {
    /// Notification direction string for this role
    pub fn direction(&self) -> &'static str {
        match self {
            LegRole::ALeg => "inbound",
            LegRole::BLeg => "outbound",
            LegRole::Snoop => "tap",
            LegRole::Unknown => "unknown",
        }
    }
}

/// One channel participating in a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub channel_id: String,
    pub role: LegRole,
    pub ani: String,
    pub dnis: String,
    pub state: ChannelState,
}

impl ChannelRef {
    pub fn from_info(info: &ChannelInfo, role: LegRole) -> Self {
        Self {
            channel_id: info.id.clone(),
            role,
            ani: info.ani.clone(),
            dnis: info.dnis.clone(),
            state: info.state,
        }
    }

    /// Record a newly learned role; an already-assigned role wins
    pub fn assign_role(&mut self, role: LegRole) {
        if self.role == LegRole::Unknown {
            self.role = role;
        } else if role != LegRole::Unknown && role != self.role {
            tracing::warn!(
                "Ignoring role re-derivation for {}: {:?} stays over {:?}",
                self.channel_id,
                self.role,
                role
            );
        }
    }
}

/// One logical call
///
/// Stored in the shared store under the linked id with a TTL; the TTL is
/// refreshed on every mutation, and expiry is the last-resort teardown for
/// calls whose teardown events were lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub linked_id: String,
    pub legs: Vec<ChannelRef>,
    pub bridge_id: Option<String>,
    pub recording_handle: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(linked_id: &str) -> Self {
        Self {
            linked_id: linked_id.to_string(),
            legs: Vec::new(),
            bridge_id: None,
            recording_handle: None,
            created_at: Utc::now(),
        }
    }

    /// Insert or update a leg, preserving an already-assigned role
    pub fn upsert_leg(&mut self, leg: ChannelRef) {
        if let Some(existing) = self
            .legs
            .iter_mut()
            .find(|l| l.channel_id == leg.channel_id)
        {
            existing.state = leg.state;
            existing.ani = leg.ani;
            existing.dnis = leg.dnis;
            existing.assign_role(leg.role);
        } else {
            self.legs.push(leg);
        }
    }

    pub fn leg(&self, channel_id: &str) -> Option<&ChannelRef> {
        self.legs.iter().find(|l| l.channel_id == channel_id)
    }

    /// The leg recorded as the originating side, if any
    pub fn a_leg(&self) -> Option<&ChannelRef> {
        self.legs.iter().find(|l| l.role == LegRole::ALeg)
    }
}

/// Per-channel snapshot of an in-flight call
///
/// Written alongside the session record so that late events (a destroy
/// arriving after the session is gone) can still be attributed and
/// reported. `answered` is sticky: once a leg reaches `Up` it stays true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveCall {
    pub channel: ChannelRef,
    pub linked_id: String,
    pub answered: bool,
}

impl ActiveCall {
    pub fn new(channel: ChannelRef, linked_id: &str) -> Self {
        let answered = channel.state.is_up();
        Self {
            channel,
            linked_id: linked_id.to_string(),
            answered,
        }
    }

    pub fn direction(&self) -> &'static str {
        self.channel.role.direction()
    }
}
