//! Control-plane command surface

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BridgeInfo, ChannelInfo};

/// Parameters for originating a new leg
#[derive(Debug, Clone)]
pub struct OriginateParams {
    /// Endpoint to dial, e.g. `PJSIP/1001`
    pub endpoint: String,
    /// Dial context on the PBX
    pub context: String,
    /// Caller id presented to the destination
    pub caller_id: String,
    /// How long the destination may ring, in seconds
    pub timeout_secs: u64,
    /// Application arguments handed to the new channel's session-start
    pub app_args: Vec<String>,
    /// Linked id to correlate the new leg with an existing call
    pub linked_id: Option<String>,
}

/// Imperative command interface to the PBX control plane
///
/// Every operation is a suspension point; implementations must not block
/// other calls' event processing. Errors follow the benign/transient
/// taxonomy of [`crate::ControlError`].
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Answer a channel
    async fn answer(&self, channel_id: &str) -> Result<()>;

    /// Originate a new channel toward `params.endpoint`
    async fn originate(&self, params: OriginateParams) -> Result<ChannelInfo>;

    /// Hang up a channel
    async fn hangup(&self, channel_id: &str) -> Result<()>;

    /// Create a mixing bridge with the given id
    async fn create_bridge(&self, bridge_id: &str) -> Result<BridgeInfo>;

    /// Add a channel to a bridge
    async fn add_to_bridge(&self, bridge_id: &str, channel_id: &str) -> Result<()>;

    /// Destroy a bridge
    async fn destroy_bridge(&self, bridge_id: &str) -> Result<()>;

    /// Current member channel ids of a bridge
    async fn bridge_members(&self, bridge_id: &str) -> Result<Vec<String>>;

    /// Snapshot of one channel, `None` if it no longer exists
    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>>;

    /// Snapshot of every channel currently known to the control plane
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>>;

    /// Start recording a channel; returns the recording handle
    async fn start_recording(&self, channel_id: &str, name: &str) -> Result<String>;

    /// Stop a recording; returns the final file path when the control plane
    /// reports one
    async fn stop_recording(&self, handle: &str) -> Result<Option<String>>;

    /// Start an audio-tap channel listening on `channel_id`, entering the
    /// given control-plane application
    async fn start_snoop(&self, channel_id: &str, snoop_id: &str, app: &str) -> Result<ChannelInfo>;
}
