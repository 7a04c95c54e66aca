//! Tier 1: in-process cache with a fixed time-to-live.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use log::debug;
use tokio::time::Instant;

use super::CacheEntry;

struct Slot<V> {
    entry: CacheEntry<V>,
    stored_at: Instant,
}

/// TTL-bounded concurrent map.
///
/// Expired entries read as misses. They stay in the map until the next read
/// of their key drops them; nothing purges in the background.
pub struct MemoryCache<K, V> {
    entries: DashMap<K, Slot<V>>,
    ttl: Duration,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        match self.entries.get(key) {
            None => return None,
            Some(slot) if slot.stored_at.elapsed() < self.ttl => return Some(slot.entry.clone()),
            Some(_) => {}
        }

        let ttl = self.ttl;
        if self
            .entries
            .remove_if(key, |_, slot| slot.stored_at.elapsed() >= ttl)
            .is_some()
        {
            debug!("Memory cache entry {} expired", key);
        }
        None
    }

    pub fn set(&self, key: K, value: V) -> CacheEntry<V> {
        let entry = CacheEntry {
            key: key.to_string(),
            payload: Arc::new(value),
            written_at: Utc::now(),
        };
        self.entries.insert(
            key,
            Slot {
                entry: entry.clone(),
                stored_at: Instant::now(),
            },
        );
        entry
    }

    pub fn has(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MemoryCache<String, Vec<u32>> {
        MemoryCache::new(Duration::from_secs(30 * 60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_same_shared_value() {
        let cache = cache();
        cache.set("k".to_string(), vec![1, 2, 3]);

        let first = cache.get(&"k".to_string()).unwrap();
        let second = cache.get(&"k".to_string()).unwrap();
        assert!(Arc::ptr_eq(&first.payload, &second.payload));
        assert_eq!(*first.payload, vec![1, 2, 3]);
        assert_eq!(first.key, "k");
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl_but_is_purged_lazily() {
        let cache = cache();
        let key = "k".to_string();
        cache.set(key.clone(), vec![1]);

        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        assert!(cache.has(&key));

        tokio::time::advance(Duration::from_secs(60)).await;
        // Still physically present until read
        assert_eq!(cache.raw_len(), 1);
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.raw_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_ttl() {
        let cache = cache();
        let key = "k".to_string();
        cache.set(key.clone(), vec![1]);
        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        cache.set(key.clone(), vec![2]);
        tokio::time::advance(Duration::from_secs(20 * 60)).await;

        assert_eq!(*cache.get(&key).unwrap().payload, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_clear() {
        let cache = cache();
        cache.set("a".to_string(), vec![]);
        cache.set("b".to_string(), vec![]);

        assert!(cache.remove(&"a".to_string()));
        assert!(!cache.remove(&"a".to_string()));
        cache.clear();
        assert!(!cache.has(&"b".to_string()));
    }
}
