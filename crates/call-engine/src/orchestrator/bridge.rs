//! Bridge lifecycle management
//!
//! Idempotent create/join/destroy of the mixing point for a call. All three
//! operations are safe to call multiple times concurrently for the same
//! bridge id: the benign control-plane outcomes ("already exists" on
//! create, "not found" on destroy) are success, not failure.

use std::sync::Arc;

use callflow_control_core::{ControlError, ControlPlane};

use crate::error::Result;

/// Idempotent bridge operations
#[derive(Clone)]
pub struct BridgeManager {
    control: Arc<dyn ControlPlane>,
}

impl BridgeManager {
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self { control }
    }

    /// Create the bridge if it does not already exist
    pub async fn ensure(&self, bridge_id: &str) -> Result<()> {
        match self.control.create_bridge(bridge_id).await {
            Ok(_) => {
                tracing::info!("Created bridge {}", bridge_id);
                Ok(())
            }
            Err(ControlError::AlreadyExists(_)) => {
                tracing::debug!("Bridge {} already exists", bridge_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Join a channel to the bridge
    pub async fn add_channel(&self, bridge_id: &str, channel_id: &str) -> Result<()> {
        match self.control.add_to_bridge(bridge_id, channel_id).await {
            Ok(()) => {
                tracing::debug!("Added {} to bridge {}", channel_id, bridge_id);
                Ok(())
            }
            Err(ControlError::AlreadyExists(_)) => {
                tracing::debug!("{} is already in bridge {}", channel_id, bridge_id);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to add {} to bridge {}: {}", channel_id, bridge_id, e);
                Err(e.into())
            }
        }
    }

    /// Tear the bridge down; someone else having done it already is fine
    pub async fn destroy(&self, bridge_id: &str) -> Result<()> {
        match self.control.destroy_bridge(bridge_id).await {
            Ok(()) => {
                tracing::info!("Destroyed bridge {}", bridge_id);
                Ok(())
            }
            Err(ControlError::NotFound(_)) => {
                tracing::debug!("Bridge {} already gone", bridge_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Current member channel ids
    pub async fn members(&self, bridge_id: &str) -> callflow_control_core::Result<Vec<String>> {
        self.control.bridge_members(bridge_id).await
    }
}
