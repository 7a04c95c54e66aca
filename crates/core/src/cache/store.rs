//! Persistent key/value store abstraction behind the persisted cache tier.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use log::warn;

use crate::errors::CacheError;

/// Raw byte store that survives restarts.
///
/// Implementations are expected to be bounded: a `put` of a new key into a full
/// store fails with [`CacheError::QuotaExceeded`]. Overwriting an existing key
/// never counts against the quota.
pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    fn keys(&self) -> Result<Vec<String>, CacheError>;
}

/// In-memory [`PersistentStore`] with an optional entry-count quota.
///
/// Useful for tests and for running without a database.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    capacity: Option<usize>,
}

impl MemoryStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding at most `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: Some(capacity),
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Memory store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.lock_entries().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut entries = self.lock_entries();
        if let Some(capacity) = self.capacity {
            if !entries.contains_key(key) && entries.len() >= capacity {
                return Err(CacheError::QuotaExceeded(format!(
                    "memory store holds {} of {} entries",
                    entries.len(),
                    capacity
                )));
            }
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock_entries().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.lock_entries().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put("a", b"1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));

        store.delete("a").unwrap();
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_capacity_rejects_new_keys_only() {
        let store = MemoryStore::with_capacity(2);
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();

        let err = store.put("c", b"3").unwrap_err();
        assert!(err.is_quota_exceeded());

        store.put("a", b"overwrite").unwrap();
        assert_eq!(store.len(), 2);
    }
}
