//! TTL cache of complete analysis results
//!
//! Entries expire `ttl` after insertion. When the cache is full the least
//! recently read entry is evicted. A zero TTL disables the cache entirely.
//!
//! `max_entries` is a soft bound: concurrent inserts of new keys can overshoot
//! it briefly, and the next insert evicts back below it. Eviction scans every
//! entry, so it costs O(n) per insert into a full cache.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Longest TTL honoured; larger values are clamped
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_used: AtomicU64,
}

pub struct ResultCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    max_entries: usize,
    /// Logical clock for recency; bumped on every read and write
    tick: AtomicU64,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        if ttl > MAX_TTL {
            warn!("Cache TTL of {}s clamped to {}s", ttl.as_secs(), MAX_TTL.as_secs());
        }
        Self {
            entries: DashMap::new(),
            ttl: ttl.min(MAX_TTL),
            max_entries,
            tick: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }

        let now = Instant::now();
        match self.entries.get(key) {
            None => return None,
            Some(entry) if entry.expires_at > now => {
                entry.last_used.store(self.next_tick(), Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        // The read guard is released before removing from the same shard.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        if !self.is_enabled() {
            return;
        }

        let key = key.into();
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.max_entries {
                if !self.evict_least_recent() {
                    break;
                }
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
                last_used: AtomicU64::new(self.next_tick()),
            },
        );
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns false when there was nothing left to evict
    fn evict_least_recent(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_used.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                debug!("Cache full, evicting least recently used entry");
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }
}
