//! Channel and bridge data model

use std::fmt;

use serde::{Deserialize, Serialize};

/// Signaling state of a channel as reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Down,
    Ring,
    Ringing,
    Up,
    Busy,
    Congestion,
    Failed,
}

impl ChannelState {
    /// Whether the channel has answered
    pub fn is_up(&self) -> bool {
        matches!(self, ChannelState::Up)
    }

    /// Whether the state means the call can no longer succeed
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            ChannelState::Busy | ChannelState::Congestion | ChannelState::Failed | ChannelState::Down
        )
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Down => "Down",
            ChannelState::Ring => "Ring",
            ChannelState::Ringing => "Ringing",
            ChannelState::Up => "Up",
            ChannelState::Busy => "Busy",
            ChannelState::Congestion => "Congestion",
            ChannelState::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of one channel
///
/// `linked_id` is the control plane's correlation identifier. It is ideally
/// shared by all legs of one call but is not guaranteed to be echoed on
/// every leg, which is why correlation never relies on it alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub state: ChannelState,
    /// Calling-party number
    pub ani: String,
    /// Dialed number
    pub dnis: String,
    pub linked_id: Option<String>,
}

impl ChannelInfo {
    /// The linked id, falling back to the channel's own id
    ///
    /// A channel that never had a linked id assigned is its own call.
    pub fn linked_or_own_id(&self) -> &str {
        self.linked_id.as_deref().unwrap_or(&self.id)
    }

    /// Whether this channel belongs to the call identified by `linked_id`
    pub fn belongs_to(&self, linked_id: &str) -> bool {
        self.linked_id.as_deref() == Some(linked_id) || self.id == linked_id
    }
}

/// Snapshot of one mixing bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeInfo {
    pub id: String,
    pub channels: Vec<String>,
}
