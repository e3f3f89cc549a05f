//! # In-Memory Coordination Store
//!
//! Process-local implementation of [`CoordinationStore`] for tests and
//! single-process development runs.
//!
//! - **TTL**: expiry is lazy and measured on `tokio::time::Instant`, so tests
//!   running with a paused clock can expire keys with `tokio::time::advance`
//! - **Atomicity**: every operation goes through a single `DashMap` entry, which
//!   gives the same per-key atomicity Redis provides
//!
//! **Important**: this store is NOT shared across processes. Use the redis
//! provider whenever more than one worker process participates.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::coordination::errors::{CoordinationError, CoordinationResult};
use crate::coordination::traits::CoordinationStore;

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn text(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: StoredValue::Text(value.to_string()),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str) -> CoordinationError {
    CoordinationError::BackendError(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

/// In-memory coordination store
#[derive(Debug, Default)]
pub struct InMemoryCoordinationStore {
    entries: DashMap<String, StoredEntry>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys (for testing)
    pub fn key_count(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Remaining TTL of a key, `None` when absent or persistent (for testing)
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries.get(key).and_then(|entry| {
            entry
                .expires_at
                .filter(|at| *at > now)
                .map(|at| at.duration_since(now))
        })
    }

    /// Drop every key (for testing)
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn purge_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn get(&self, key: &str) -> CoordinationResult<Option<String>> {
        self.purge_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                StoredValue::Text(value) => Ok(Some(value.clone())),
                StoredValue::Set(_) => Err(wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoordinationResult<()> {
        self.entries
            .insert(key.to_string(), StoredEntry::text(value, ttl));
        debug!(key = key, ttl = ?ttl, "SET (memory)");
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> CoordinationResult<bool> {
        let now = Instant::now();
        let written = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredEntry::text(value, ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::text(value, ttl));
                true
            }
        };
        debug!(key = key, written = written, "SET NX (memory)");
        Ok(written)
    }

    async fn exists(&self, key: &str) -> CoordinationResult<bool> {
        self.purge_if_expired(key);
        Ok(self.entries.contains_key(key))
    }

    async fn delete(&self, keys: &[String]) -> CoordinationResult<u64> {
        let now = Instant::now();
        let mut deleted = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(key) {
                if !entry.is_expired(now) {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn increment(&self, key: &str, by: i64) -> CoordinationResult<i64> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredEntry::text(&by.to_string(), None));
                    return Ok(by);
                }
                let entry = occupied.get_mut();
                let current = match &entry.value {
                    StoredValue::Text(text) => text.parse::<i64>().map_err(|_| {
                        CoordinationError::SerializationError(format!(
                            "value at '{key}' is not an integer"
                        ))
                    })?,
                    StoredValue::Set(_) => return Err(wrong_type(key)),
                };
                let next = current + by;
                entry.value = StoredValue::Text(next.to_string());
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::text(&by.to_string(), None));
                Ok(by)
            }
        }
    }

    async fn set_add(&self, key: &str, members: &[String]) -> CoordinationResult<u64> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredEntry {
                value: StoredValue::Set(HashSet::new()),
                expires_at: None,
            });
        if entry.is_expired(now) {
            *entry = StoredEntry {
                value: StoredValue::Set(HashSet::new()),
                expires_at: None,
            };
        }
        match &mut entry.value {
            StoredValue::Set(set) => Ok(members
                .iter()
                .filter(|member| set.insert((*member).clone()))
                .count() as u64),
            StoredValue::Text(_) => Err(wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> CoordinationResult<bool> {
        self.purge_if_expired(key);
        let removed = match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                StoredValue::Set(set) => set.remove(member),
                StoredValue::Text(_) => return Err(wrong_type(key)),
            },
            None => false,
        };
        // Redis drops a set once its last member is removed
        self.entries.remove_if(key, |_, entry| {
            matches!(&entry.value, StoredValue::Set(set) if set.is_empty())
        });
        Ok(removed)
    }

    async fn set_cardinality(&self, key: &str) -> CoordinationResult<u64> {
        self.purge_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                StoredValue::Set(set) => Ok(set.len() as u64),
                StoredValue::Text(_) => Err(wrong_type(key)),
            },
            None => Ok(0),
        }
    }

    async fn set_members(&self, key: &str) -> CoordinationResult<Vec<String>> {
        self.purge_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                StoredValue::Set(set) => {
                    let mut members: Vec<String> = set.iter().cloned().collect();
                    members.sort();
                    Ok(members)
                }
                StoredValue::Text(_) => Err(wrong_type(key)),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> CoordinationResult<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn extend_if_value(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> CoordinationResult<bool> {
        self.purge_if_expired(key);
        match self.entries.get_mut(key) {
            Some(mut entry) => match &entry.value {
                StoredValue::Text(value) if value == expected => {
                    entry.expires_at = Some(Instant::now() + ttl);
                    Ok(true)
                }
                _ => Ok(false),
            },
            None => Ok(false),
        }
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> CoordinationResult<bool> {
        let now = Instant::now();
        let removed = self.entries.remove_if(key, |_, entry| {
            !entry.is_expired(now)
                && matches!(&entry.value, StoredValue::Text(value) if value == expected)
        });
        Ok(removed.is_some())
    }

    async fn health_check(&self) -> CoordinationResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
