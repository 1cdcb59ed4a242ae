//! Shared state store for the Callflow stack
//!
//! Call state in Callflow lives outside the process: event handlers for the
//! same call run as independent concurrent tasks (possibly in independent
//! processes), so the session registry, pair relations, hangup markers and
//! locks all go through the [`KeyValueStore`] trait rather than process
//! memory. The trait models a low-latency key-value store with per-key
//! expiry and an atomic set-if-absent primitive.
//!
//! The crate ships two things on top of the trait:
//!
//! - [`MemoryStore`]: an in-process implementation used by tests and
//!   single-node deployments.
//! - [`DistributedLock`]: acquire/release built on set-if-absent plus
//!   compare-and-delete, used to serialize per-call cleanup.

pub mod error;
pub mod lock;
pub mod memory;
pub mod store;

pub use error::{Result, StoreError};
pub use lock::{DistributedLock, LockToken};
pub use memory::MemoryStore;
pub use store::{KeyTtl, KeyValueStore};
