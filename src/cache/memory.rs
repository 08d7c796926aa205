//! Process-local cache backend.

use super::{Cache, CacheError, Ttl};
use crate::request::RequestDetails;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use globset::Glob;
use serde_json::Value;
use std::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Value, ttl: Ttl, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.deadline(now),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// In-memory [`Cache`] backed by a [`DashMap`].
///
/// Expired entries are dropped lazily, on the next access to their key or on
/// the next `keys` scan. Conditional writes (`set_if_absent`, `incr_by`,
/// `rpush`) hold the shard lock for the key for their whole read-modify-write,
/// so concurrent callers observe them atomically.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the entry at `key` if it has expired.
    fn evict_if_expired(&self, key: &str, now: Instant) {
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(
        &self,
        key: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<Option<Value>, CacheError> {
        let now = Instant::now();
        self.evict_if_expired(key, now);
        let value = self.entries.get(key).map(|entry| entry.value.clone());
        tracing::trace!(
            request_id = %request.request_id,
            key,
            operation = op,
            hit = value.is_some(),
            "Cache get"
        );
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl, Instant::now()));
        tracing::trace!(request_id = %request.request_id, key, operation = op, ?ttl, "Cache set");
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let written = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    false
                } else {
                    occupied.insert(CacheEntry::new(value, ttl, now));
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value, ttl, now));
                true
            }
        };
        tracing::trace!(
            request_id = %request.request_id,
            key,
            operation = op,
            written,
            "Cache set if absent"
        );
        Ok(written)
    }

    async fn delete(
        &self,
        key: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<(), CacheError> {
        self.entries.remove(key);
        tracing::trace!(request_id = %request.request_id, key, operation = op, "Cache delete");
        Ok(())
    }

    async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<i64, CacheError> {
        let now = Instant::now();
        let updated = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = if occupied.get().is_live(now) {
                    occupied
                        .get()
                        .value
                        .as_i64()
                        .ok_or_else(|| CacheError::NotAnInteger(key.to_string()))?
                } else {
                    0
                };
                let updated = current.saturating_add(delta);
                occupied.insert(CacheEntry::new(Value::from(updated), ttl, now));
                updated
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(Value::from(delta), ttl, now));
                delta
            }
        };
        tracing::trace!(
            request_id = %request.request_id,
            key,
            operation = op,
            delta,
            updated,
            "Cache incr"
        );
        Ok(updated)
    }

    async fn rpush(
        &self,
        key: &str,
        value: Value,
        op: &str,
        request: &RequestDetails,
        ttl: Ttl,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !entry.is_live(now) {
                    entry.value = Value::Array(Vec::new());
                }
                match &mut entry.value {
                    Value::Array(items) => items.push(value),
                    _ => return Err(CacheError::NotAList(key.to_string())),
                }
                entry.expires_at = ttl.deadline(now);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(Value::Array(vec![value]), ttl, now));
            }
        }
        tracing::trace!(request_id = %request.request_id, key, operation = op, "Cache rpush");
        Ok(())
    }

    async fn keys(
        &self,
        pattern: &str,
        op: &str,
        request: &RequestDetails,
    ) -> Result<Vec<String>, CacheError> {
        let matcher = Glob::new(pattern)
            .map_err(|e| CacheError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?
            .compile_matcher();

        let now = Instant::now();
        // Collect first; removing while iterating would deadlock on the shard.
        let mut expired = Vec::new();
        let mut keys = Vec::new();
        for entry in self.entries.iter() {
            if !entry.is_live(now) {
                expired.push(entry.key().clone());
            } else if matcher.is_match(entry.key()) {
                keys.push(entry.key().clone());
            }
        }
        for key in expired {
            self.evict_if_expired(&key, now);
        }
        keys.sort();

        tracing::trace!(
            request_id = %request.request_id,
            pattern,
            operation = op,
            matched = keys.len(),
            "Cache keys"
        );
        Ok(keys)
    }

    async fn clear(&self, request: &RequestDetails) -> Result<(), CacheError> {
        self.entries.clear();
        tracing::debug!(request_id = %request.request_id, "Cache cleared");
        Ok(())
    }
}
