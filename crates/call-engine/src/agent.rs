//! Voice-agent seam
//!
//! Automated voice agents (IVR-style conversational handlers) are external
//! collaborators. The engine answers the channel, waits out a short
//! protective delay, then hands the channel over; the agent owns it until
//! it hangs up or returns.

use std::sync::Arc;

use async_trait::async_trait;
use callflow_control_core::{ChannelInfo, ControlPlane};

use crate::error::Result;

/// Everything an agent needs to own a channel
pub struct AgentContext {
    /// Command handle to the control plane
    pub control: Arc<dyn ControlPlane>,
    /// The channel being handed over
    pub channel: ChannelInfo,
    pub ani: String,
    pub dnis: String,
    pub linked_id: String,
    /// The mode tag that routed the call here
    pub mode: String,
    /// Dial context the call arrived through
    pub context: String,
}

/// External voice-agent collaborator
#[async_trait]
pub trait VoiceAgent: Send + Sync {
    /// Take ownership of the channel until the conversation ends
    async fn handle(&self, ctx: AgentContext) -> Result<()>;
}
