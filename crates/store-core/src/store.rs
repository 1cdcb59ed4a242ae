//! The `KeyValueStore` trait
//!
//! Interface boundary to the external shared store. Implementations must
//! guarantee that [`KeyValueStore::set_if_absent`] is atomic with respect to
//! concurrent callers and that [`KeyValueStore::delete_if_equals`] compares
//! and deletes in one step; the distributed lock is built entirely on those
//! two guarantees.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Expiry state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist
    Missing,
    /// The key exists and never expires
    NoExpiry,
    /// The key exists and expires after the given duration
    Expires(Duration),
}

/// Low-latency key-value store with per-key expiry
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value of a key, `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a key, optionally with an expiry
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Delete a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically set a key only if it is absent; returns whether it was set
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Atomically delete a key only if its current value equals `expected`;
    /// returns whether the delete happened
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    /// List all live keys starting with `prefix`
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Inspect the expiry state of a key
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;

    /// Atomically increment an integer key, creating it at 0 first
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Append a value to a list key; returns the new list length
    async fn push(&self, key: &str, value: &str) -> Result<usize>;

    /// Read the full contents of a list key
    async fn range(&self, key: &str) -> Result<Vec<String>>;
}
