//! In-process store implementation
//!
//! `MemoryStore` implements [`KeyValueStore`] on a `DashMap` with lazily
//! evaluated expiry stamps: an expired entry is indistinguishable from a
//! missing one and is dropped on the next access that touches it. Suitable
//! for tests and single-node deployments; multi-node deployments plug in an
//! external store behind the same trait.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{Result, StoreError};
use crate::store::{KeyTtl, KeyValueStore};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Int(i64),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn live(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

/// DashMap-backed [`KeyValueStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    fn deadline(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|d| Instant::now() + d)
    }

    /// Fetch a live slot, dropping it if expired
    fn live_slot(&self, key: &str) -> Option<Slot> {
        let slot = self.slots.get(key).map(|entry| entry.value().clone())?;
        if slot.live() {
            Some(slot)
        } else {
            self.slots.remove_if(key, |_, current| !current.live());
            None
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.live_slot(key) {
            Some(slot) => match slot.value {
                Value::Str(s) => Ok(Some(s)),
                Value::Int(n) => Ok(Some(n.to_string())),
                Value::List(_) => Err(StoreError::WrongType(key.to_string())),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: Self::deadline(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match self.slots.remove(key) {
            Some((_, slot)) => Ok(slot.live()),
            None => Ok(false),
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let slot = Slot {
            value: Value::Str(value.to_string()),
            expires_at: Self::deadline(ttl),
        };
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().live() {
                    Ok(false)
                } else {
                    occupied.insert(slot);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let removed = self.slots.remove_if(key, |_, slot| {
            slot.live() && matches!(&slot.value, Value::Str(s) if s == expected)
        });
        Ok(removed.is_some())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .slots
            .iter()
            .filter(|entry| entry.value().live() && entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        match self.live_slot(key) {
            None => Ok(KeyTtl::Missing),
            Some(slot) => match slot.expires_at {
                None => Ok(KeyTtl::NoExpiry),
                Some(deadline) => Ok(KeyTtl::Expires(
                    deadline.saturating_duration_since(Instant::now()),
                )),
            },
        }
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().live() {
                    occupied.insert(Slot {
                        value: Value::Int(1),
                        expires_at: None,
                    });
                    return Ok(1);
                }
                let slot = occupied.get_mut();
                let next = match &slot.value {
                    Value::Int(n) => n + 1,
                    Value::Str(s) => {
                        s.parse::<i64>()
                            .map_err(|_| StoreError::WrongType(key.to_string()))?
                            + 1
                    }
                    Value::List(_) => return Err(StoreError::WrongType(key.to_string())),
                };
                slot.value = Value::Int(next);
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    value: Value::Int(1),
                    expires_at: None,
                });
                Ok(1)
            }
        }
    }

    async fn push(&self, key: &str, value: &str) -> Result<usize> {
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().live() {
                    occupied.insert(Slot {
                        value: Value::List(vec![value.to_string()]),
                        expires_at: None,
                    });
                    return Ok(1);
                }
                match &mut occupied.get_mut().value {
                    Value::List(items) => {
                        items.push(value.to_string());
                        Ok(items.len())
                    }
                    _ => Err(StoreError::WrongType(key.to_string())),
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    value: Value::List(vec![value.to_string()]),
                    expires_at: None,
                });
                Ok(1)
            }
        }
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        match self.live_slot(key) {
            None => Ok(Vec::new()),
            Some(slot) => match slot.value {
                Value::List(items) => Ok(items),
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }
}
