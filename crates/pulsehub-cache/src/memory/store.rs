//! In-memory store implementation using the moka crate.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::Expiry;
use moka::future::Cache;

use tracing::debug;

use pulsehub_core::config::cache::MemoryCacheConfig;
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::cache::CacheProvider;

/// A stored value with its own TTL.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Pushes between sweeps of expired lists.
const LIST_SWEEP_INTERVAL: u64 = 256;

/// A list value. The TTL is reset on every push.
#[derive(Debug)]
struct ListEntry {
    items: VecDeque<String>,
    expires_at: Instant,
}

impl ListEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory store provider using moka for values and a DashMap for lists.
#[derive(Debug, Clone)]
pub struct MemoryCacheProvider {
    /// Key/value entries with per-entry TTL.
    cache: Cache<String, Entry>,
    /// Capped lists. Expired lists are dropped on read and by a sweep
    /// every `LIST_SWEEP_INTERVAL` pushes.
    lists: Arc<DashMap<String, ListEntry>>,
    /// Pushes since creation, drives the sweep.
    pushes: Arc<AtomicU64>,
}

impl MemoryCacheProvider {
    /// Create a new in-memory store from configuration.
    pub fn new(config: &MemoryCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            cache,
            lists: Arc::new(DashMap::new()),
            pushes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Drops every expired list, including ones nobody reads again.
    fn sweep_expired_lists(&self) {
        let before = self.lists.len();
        self.lists.retain(|_, list| !list.is_expired());
        let swept = before.saturating_sub(self.lists.len());
        if swept > 0 {
            debug!(swept, "Expired lists swept");
        }
    }

    fn entry(value: &str, ttl: Duration) -> Entry {
        Entry {
            value: value.to_string(),
            ttl,
        }
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.cache.get(key).await.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.cache
            .insert(key.to_string(), Self::entry(value, ttl))
            .await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        if self.cache.contains_key(key) {
            return Ok(true);
        }
        Ok(self
            .lists
            .get(key)
            .is_some_and(|l| !l.is_expired() && !l.items.is_empty()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        if let Some(mut list) = self.lists.get_mut(key) {
            if !list.is_expired() {
                list.expires_at = Instant::now() + ttl;
                return Ok(true);
            }
        }
        // Re-insert with the new TTL; moka reads it back through `PerEntryTtl`.
        match self.cache.get(key).await {
            Some(current) => {
                self.cache
                    .insert(key.to_string(), Self::entry(&current.value, ttl))
                    .await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_push(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> AppResult<usize> {
        // Sweep before taking the entry lock; `retain` locks every shard.
        let pushed = self.pushes.fetch_add(1, Ordering::Relaxed) + 1;
        if pushed % LIST_SWEEP_INTERVAL == 0 {
            self.sweep_expired_lists();
        }
        let mut list = self
            .lists
            .entry(key.to_string())
            .or_insert_with(|| ListEntry {
                items: VecDeque::new(),
                expires_at: Instant::now() + ttl,
            });
        if list.is_expired() {
            list.items.clear();
        }
        list.items.push_back(value.to_string());
        while list.items.len() > max_len.max(1) {
            list.items.pop_front();
        }
        list.expires_at = Instant::now() + ttl;
        Ok(list.items.len())
    }

    async fn list_range(&self, key: &str) -> AppResult<Vec<String>> {
        let expired = match self.lists.get(key) {
            Some(list) if !list.is_expired() => return Ok(list.items.iter().cloned().collect()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.lists.remove_if(key, |_, l| l.is_expired());
        }
        Ok(Vec::new())
    }

    async fn list_remove(&self, key: &str, value: &str) -> AppResult<usize> {
        let Some(mut list) = self.lists.get_mut(key) else {
            return Ok(0);
        };
        let before = list.items.len();
        list.items.retain(|v| v != value);
        let removed = before - list.items.len();
        let empty = list.items.is_empty();
        drop(list);
        if empty {
            self.lists.remove_if(key, |_, l| l.items.is_empty());
        }
        Ok(removed)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
