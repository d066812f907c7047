// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owner-scoped TTL cache for GET responses.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Entry {
    value: serde_json::Value,
    stored_at: Instant,
}

/// Cached JSON bodies keyed by (owner id, path).
///
/// Lookups never cross owners, so a cached body of one user cannot be
/// served after another user logs in even if `clear` was missed.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl ResponseCache {
    /// A zero `ttl` disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, owner_id: &str, path: &str) -> Option<serde_json::Value> {
        self.get_at(owner_id, path, Instant::now())
    }

    pub(crate) fn get_at(
        &self,
        owner_id: &str,
        path: &str,
        now: Instant,
    ) -> Option<serde_json::Value> {
        let mut entries = self.entries.lock();
        let key = (owner_id.to_owned(), path.to_owned());
        let entry = entries.get(&key)?;
        if now.saturating_duration_since(entry.stored_at) >= self.ttl {
            entries.remove(&key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, owner_id: &str, path: &str, value: serde_json::Value) {
        self.insert_at(owner_id, path, value, Instant::now());
    }

    pub(crate) fn insert_at(
        &self,
        owner_id: &str,
        path: &str,
        value: serde_json::Value,
        now: Instant,
    ) {
        if self.ttl.is_zero() {
            return;
        }
        let ttl = self.ttl;
        let mut entries = self.entries.lock();
        entries.retain(|_, e| now.saturating_duration_since(e.stored_at) < ttl);
        entries.insert((owner_id.to_owned(), path.to_owned()), Entry { value, stored_at: now });
    }

    /// Drop every owner's entry for `path`.
    pub fn invalidate(&self, path: &str) {
        self.entries.lock().retain(|(_, p), _| p != path);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
