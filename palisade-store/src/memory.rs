//! In-process registry store
//!
//! `MemoryStore` keeps entries in a `DashMap` and expires them lazily: an
//! entry past its deadline is treated as absent by `get`/`scan` and removed
//! on the next touch. There is no background sweeper; the store's working
//! set is bounded by run TTLs and run cleanup.

use crate::store::{RegistryStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Process-local [`RegistryStore`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries. Test and diagnostics helper.
    pub fn live_len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Drop the read guard before removing the expired entry.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let now = Instant::now();
        let mut results = Vec::new();
        for entry in self.entries.iter() {
            if entry.key().starts_with(prefix) && !entry.value().is_expired(now) {
                results.push((entry.key().clone(), entry.value().value.clone()));
            }
        }
        Ok(results)
    }
}
