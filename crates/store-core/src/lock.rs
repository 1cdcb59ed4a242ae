//! Distributed lock
//!
//! Built on the store's atomic set-if-absent plus compare-and-delete.
//! Acquisition never blocks: a held lock means another worker is already
//! handling the guarded work, and the caller is expected to skip. Release
//! presents the token it was granted, so a delayed release cannot clobber a
//! newer holder after the lock expired and was re-acquired.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::Result;
use crate::store::{KeyTtl, KeyValueStore};

/// Opaque ownership token returned by a successful acquire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Store-backed lock with a shared key prefix
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Try to take the lock named `name` for `ttl`
    ///
    /// Returns `None` when the lock is already held. Callers must treat that
    /// as "another worker has this" and skip, not retry.
    pub async fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let token = Uuid::new_v4().to_string();
        let key = self.key(name);
        if self.store.set_if_absent(&key, &token, Some(ttl)).await? {
            tracing::debug!("Acquired lock {} with token {}", key, token);
            Ok(Some(LockToken(token)))
        } else {
            tracing::debug!("Lock {} already held, skipping", key);
            Ok(None)
        }
    }

    /// Release a lock previously acquired with `token`
    ///
    /// Compare-and-delete: if the stored token no longer matches (the lock
    /// expired and someone else re-acquired it), this is a no-op and returns
    /// `false`.
    pub async fn release(&self, name: &str, token: &LockToken) -> Result<bool> {
        let key = self.key(name);
        let released = self.store.delete_if_equals(&key, &token.0).await?;
        if !released {
            tracing::warn!("Lock {} was not held by our token at release", key);
        }
        Ok(released)
    }

    /// Unconditionally delete a lock key
    ///
    /// Last resort when a guarded release failed: an orphaned lock would
    /// block every future acquire for its full TTL.
    pub async fn force_release(&self, name: &str) -> Result<bool> {
        let key = self.key(name);
        tracing::warn!("Force-releasing lock {}", key);
        self.store.delete(&key).await
    }

    /// Delete lock keys that have no expiry
    ///
    /// A lock that lost its TTL (the expiry failed to apply on the store
    /// side) would never be reclaimed and would wedge all future holders.
    /// The server runs this periodically.
    pub async fn sweep_orphans(&self) -> Result<usize> {
        let mut swept = 0;
        for key in self.store.keys(&self.prefix).await? {
            if self.store.ttl(&key).await? == KeyTtl::NoExpiry {
                tracing::warn!("Sweeping orphaned lock {} with no expiry", key);
                if self.store.delete(&key).await? {
                    swept += 1;
                }
            }
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn lock_over_memory() -> (Arc<MemoryStore>, DistributedLock) {
        let store = Arc::new(MemoryStore::new());
        let lock = DistributedLock::new(store.clone(), "lock:");
        (store, lock)
    }

    #[tokio::test]
    async fn second_acquire_is_refused_until_release() {
        let (_, lock) = lock_over_memory();
        let ttl = Duration::from_secs(10);

        let token = lock.acquire("call-1", ttl).await.unwrap().unwrap();
        assert!(lock.acquire("call-1", ttl).await.unwrap().is_none());

        assert!(lock.release("call-1", &token).await.unwrap());
        assert!(lock.acquire("call-1", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_release_does_not_clobber_new_holder() {
        let (_, lock) = lock_over_memory();

        let stale = lock
            .acquire("call-1", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Lock expired; a new worker takes it
        let fresh = lock
            .acquire("call-1", Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();

        // The old holder's late release must not remove the new lock
        assert!(!lock.release("call-1", &stale).await.unwrap());
        assert!(lock
            .acquire("call-1", Duration::from_secs(10))
            .await
            .unwrap()
            .is_none());
        assert!(lock.release("call-1", &fresh).await.unwrap());
    }

    #[tokio::test]
    async fn sweep_removes_only_expiry_less_locks() {
        let (store, lock) = lock_over_memory();

        // Simulate a lock whose expiry failed to apply
        store.set("lock:orphan", "token", None).await.unwrap();
        lock.acquire("healthy", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(lock.sweep_orphans().await.unwrap(), 1);
        assert_eq!(store.get("lock:orphan").await.unwrap(), None);
        // The healthy lock is still held
        assert!(lock
            .acquire("healthy", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn concurrent_acquires_have_one_winner() {
        let (store, _) = lock_over_memory();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let lock = DistributedLock::new(store, "lock:");
                lock.acquire("contended", Duration::from_secs(10))
                    .await
                    .unwrap()
                    .is_some()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
