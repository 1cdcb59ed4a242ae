//! Error types for store operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Unreachable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Wrong value type for key {0}")]
    WrongType(String),

    #[error("Internal store error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
