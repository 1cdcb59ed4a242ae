//! Infrastructure error types
//!
//! A small error enum for infrastructure-level failures plus an extension
//! trait for attaching component/operation context when an error is handed
//! up to a caller that no longer knows where it came from.

use std::fmt;
use thiserror::Error;

/// Infrastructure-level errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Context information for an error
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Component where the error occurred
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
}

impl ErrorContext {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in {} during {}", self.component, self.operation)
    }
}

/// Extension trait for adding context to errors
pub trait ErrorExt {
    /// Annotate an error with the component and operation it occurred in
    fn with_context(self, component: &str, operation: &str) -> Error;
}

impl ErrorExt for Error {
    fn with_context(self, component: &str, operation: &str) -> Error {
        let ctx = ErrorContext::new(component, operation);
        match self {
            Error::Config(msg) => Error::Config(format!("{} [{}]", msg, ctx)),
            Error::Io(msg) => Error::Io(format!("{} [{}]", msg, ctx)),
            Error::Internal(msg) => Error::Internal(format!("{} [{}]", msg, ctx)),
        }
    }
}
