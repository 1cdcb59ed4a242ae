//! Control-plane event stream
//!
//! The five per-channel lifecycle events the engine consumes, plus the
//! connectivity events of the underlying transport. One logical worker is
//! dispatched per event; no ordering is guaranteed across legs of the same
//! call, and duplicates are possible — every handler is written for that.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelInfo, ChannelState};

/// Events pushed by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlEvent {
    /// A channel entered a control-plane application
    ///
    /// `app` scopes the event: the engine's main application drives call
    /// setup, while the dedicated snoop application drives the audio-tap
    /// contract machine. `args` is the raw application argument vector.
    SessionStart {
        channel: ChannelInfo,
        app: String,
        args: Vec<String>,
    },

    /// A channel left a control-plane application
    SessionEnd { channel_id: String, app: String },

    /// A channel changed signaling state
    StateChange {
        channel_id: String,
        state: ChannelState,
    },

    /// A hangup was requested for a channel
    HangupRequest { channel_id: String },

    /// A channel was destroyed
    ChannelDestroyed { channel_id: String },

    /// A channel left a bridge
    LeftBridge {
        channel_id: String,
        bridge_id: String,
    },

    /// Transport connectivity
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },

    /// Reconnection attempts are exhausted
    ///
    /// The process must restart rather than keep running in a degraded,
    /// possibly-duplicating state.
    MaxRetriesExceeded,
}

impl ControlEvent {
    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ControlEvent::SessionStart { .. } => "session-start",
            ControlEvent::SessionEnd { .. } => "session-end",
            ControlEvent::StateChange { .. } => "state-change",
            ControlEvent::HangupRequest { .. } => "hangup-request",
            ControlEvent::ChannelDestroyed { .. } => "channel-destroyed",
            ControlEvent::LeftBridge { .. } => "left-bridge",
            ControlEvent::Connected => "connected",
            ControlEvent::Disconnected => "disconnected",
            ControlEvent::Reconnecting { .. } => "reconnecting",
            ControlEvent::MaxRetriesExceeded => "max-retries-exceeded",
        }
    }
}
