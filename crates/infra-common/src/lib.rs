//! Common infrastructure for the Callflow stack
//!
//! Shared plumbing used by every Callflow crate: logging setup built on
//! `tracing-subscriber`, and an error-context extension trait for attaching
//! component/operation information to errors as they cross crate boundaries.

pub mod errors;
pub mod logging;

pub use errors::{Error, ErrorContext, ErrorExt, Result};
pub use logging::{setup_logging, LoggingConfig};
