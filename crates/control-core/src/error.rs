//! Error types for control-plane operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    /// The referenced channel, bridge or recording does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource already exists (idempotent creates hit this)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The control plane refused the command
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// The control plane could not be reached
    #[error("Control plane unreachable: {0}")]
    Unreachable(String),

    /// Malformed payload on the wire
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ControlError {
    /// Whether this error is an expected outcome of concurrent call handling
    ///
    /// Benign errors ("already exists", "not found") are treated as success
    /// by idempotent operations and never logged as errors.
    pub fn is_benign(&self) -> bool {
        matches!(self, ControlError::NotFound(_) | ControlError::AlreadyExists(_))
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
