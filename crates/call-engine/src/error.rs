//! Error types for the call engine

use callflow_control_core::ControlError;
use callflow_store_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Control plane error: {0}")]
    Control(#[from] ControlError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Control-plane reconnection attempts are exhausted; the process must
    /// restart rather than keep running in a possibly-duplicating state.
    #[error("Control plane connection lost")]
    ConnectionLost,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Collapse a benign control-plane error into `Ok(None)`
///
/// "Already exists" and "not found" are expected outcomes of concurrent
/// call handling; idempotent operations treat them as success.
pub fn ok_if_benign<T>(result: callflow_control_core::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_benign() => {
            tracing::debug!("Tolerating benign control-plane outcome: {}", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_errors_collapse_to_none() {
        let benign: callflow_control_core::Result<()> =
            Err(ControlError::NotFound("ch-1".into()));
        assert!(matches!(ok_if_benign(benign), Ok(None)));

        let real: callflow_control_core::Result<()> =
            Err(ControlError::Unreachable("down".into()));
        assert!(ok_if_benign(real).is_err());

        let fine: callflow_control_core::Result<u32> = Ok(7);
        assert!(matches!(ok_if_benign(fine), Ok(Some(7))));
    }
}
