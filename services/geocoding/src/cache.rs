//! In-memory TTL cache for resolved addresses
//!
//! Entries live in a `DashMap` so readers and writers on different keys
//! never contend. An entry is only ever served while `now < expires_at`;
//! expired entries are dropped lazily on read and in bulk by
//! [`TtlCache::sweep`].

use crate::clock::deadline_after;
use dashmap::DashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe key/value cache with per-entry expiry
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    default_ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Live value for `key`, if any. An expired entry is removed.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }

        self.evict_expired(key, now);
        None
    }

    /// Remove `key` if it is still expired at `now`; false when a
    /// concurrent put refreshed it or it is already gone
    fn evict_expired(&self, key: &K, now: Instant) -> bool {
        let evicted = self.entries.remove_if(key, |_, entry| !entry.is_live(now)).is_some();
        if evicted {
            trace!("Evicted expired cache entry on read");
        }
        evicted
    }

    /// Store `value` under `key` for the default TTL
    pub fn insert(&self, key: K, value: V) {
        self.put(key, value, self.default_ttl);
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry
    pub fn put(&self, key: K, value: V, ttl: Duration) {
        let expires_at = deadline_after(Instant::now(), ttl);
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// When the entry for `key` expires, if one is stored
    pub fn expires_at(&self, key: &K) -> Option<Instant> {
        self.entries.get(key).map(|entry| entry.expires_at)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drop every expired entry and return how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = entry.is_live(now);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    /// Stored entries, expired ones not yet swept included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coordinate;

    #[tokio::test(start_paused = true)]
    async fn test_entry_served_until_expiry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let key = Coordinate::new(40.41, 49.87).key(5);
        cache.insert(key, "Baku".to_string());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(&key).as_deref(), Some("Baku"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key), None);
        // Expired read removed the entry
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_with_custom_ttl() {
        let cache: TtlCache<u32, &str> = TtlCache::new(Duration::from_secs(3600));
        cache.put(1, "short", Duration::from_secs(5));
        cache.insert(2, "long");

        assert_eq!(
            cache.expires_at(&1).unwrap() - Instant::now(),
            Duration::from_secs(5)
        );

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("long"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_counts_expired_entries() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(10));
        for i in 0..5 {
            cache.insert(i, i);
        }
        tokio::time::advance(Duration::from_secs(5)).await;
        for i in 5..8 {
            cache.insert(i, i);
        }

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.len(), 8);
        assert_eq!(cache.sweep(), 5);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.sweep(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinsert_refreshes_expiry() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(10));
        cache.insert("k", 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert("k", 2);
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get(&"k"), Some(2));
        assert_eq!(cache.remove(&"k"), Some(2));
        assert_eq!(cache.get(&"k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_skips_refreshed_and_missing_entries() {
        let cache: TtlCache<&str, u32> = TtlCache::new(Duration::from_secs(10));
        cache.insert("k", 1);
        tokio::time::advance(Duration::from_secs(11)).await;
        let stale_read = Instant::now();

        // Refreshed between the expired read and the eviction
        cache.insert("k", 2);
        assert!(!cache.evict_expired(&"k", stale_read));
        assert_eq!(cache.get(&"k"), Some(2));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.evict_expired(&"k", Instant::now()));
        assert!(!cache.evict_expired(&"k", Instant::now()));
        assert!(cache.is_empty());
    }
}
