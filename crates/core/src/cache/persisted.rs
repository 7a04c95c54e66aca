//! Tier 2: chart payloads persisted in a [`PersistentStore`].
//!
//! Each chart lives under `chart:{id}`. A separate index key maps every chart
//! id to its write time and drives oldest-first eviction.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::store::PersistentStore;
use super::CacheEntry;
use crate::charts::ChartPayload;
use crate::constants::{PERSISTED_CHART_PREFIX, PERSISTED_INDEX_KEY};
use crate::errors::CacheError;

type ChartIndex = BTreeMap<String, DateTime<Utc>>;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredChart {
    key: String,
    payload: ChartPayload,
    written_at: DateTime<Utc>,
}

fn payload_key(chart_id: &str) -> String {
    format!("{}{}", PERSISTED_CHART_PREFIX, chart_id)
}

/// Persisted chart cache.
///
/// When the store reports [`CacheError::QuotaExceeded`], the oldest
/// `ceil(len * eviction_fraction)` entries (at least one) are evicted and the
/// write is retried once. A second failure is returned to the caller.
pub struct PersistedCache {
    store: Arc<dyn PersistentStore>,
    eviction_fraction: f64,
    /// Serializes read-modify-write cycles of the index.
    index_lock: Mutex<()>,
}

impl PersistedCache {
    pub fn new(store: Arc<dyn PersistentStore>, eviction_fraction: f64) -> Self {
        Self {
            store,
            eviction_fraction: eviction_fraction.clamp(0.0, 1.0),
            index_lock: Mutex::new(()),
        }
    }

    fn lock_index(&self) -> MutexGuard<'_, ()> {
        self.index_lock.lock().unwrap_or_else(|poisoned| {
            warn!("Persisted cache index mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Load the index, rebuilding it from the stored payloads if it is missing
    /// or unreadable.
    fn load_index(&self) -> Result<ChartIndex, CacheError> {
        if let Some(bytes) = self.store.get(PERSISTED_INDEX_KEY)? {
            match serde_json::from_slice::<ChartIndex>(&bytes) {
                Ok(index) => return Ok(index),
                Err(e) => warn!("Persisted chart index is corrupt, rebuilding: {}", e),
            }
        }

        let mut index = ChartIndex::new();
        for key in self.store.keys()? {
            let Some(chart_id) = key.strip_prefix(PERSISTED_CHART_PREFIX) else {
                continue;
            };
            if let Some(stored) = self.read_payload(chart_id)? {
                index.insert(chart_id.to_string(), stored.written_at);
            }
        }
        Ok(index)
    }

    fn save_index(&self, index: &ChartIndex) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(index)?;
        self.store.put(PERSISTED_INDEX_KEY, &bytes)
    }

    fn read_payload(&self, chart_id: &str) -> Result<Option<StoredChart>, CacheError> {
        let Some(bytes) = self.store.get(&payload_key(chart_id))? else {
            return Ok(None);
        };
        match serde_json::from_slice::<StoredChart>(&bytes) {
            Ok(stored) => Ok(Some(stored)),
            Err(e) => {
                warn!("Dropping unreadable persisted chart {}: {}", chart_id, e);
                self.store.delete(&payload_key(chart_id))?;
                Ok(None)
            }
        }
    }

    pub fn get(&self, chart_id: &str) -> Result<Option<CacheEntry<ChartPayload>>, CacheError> {
        match self.read_payload(chart_id)? {
            Some(stored) => Ok(Some(CacheEntry {
                key: stored.key,
                payload: Arc::new(stored.payload),
                written_at: stored.written_at,
            })),
            None => {
                self.prune_orphan(chart_id)?;
                Ok(None)
            }
        }
    }

    /// Drop an index entry whose payload is gone.
    fn prune_orphan(&self, chart_id: &str) -> Result<(), CacheError> {
        let _guard = self.lock_index();
        let mut index = self.load_index()?;
        if index.remove(chart_id).is_some() {
            debug!("Pruned orphaned index entry for {}", chart_id);
            self.save_index(&index)?;
        }
        Ok(())
    }

    pub fn has(&self, chart_id: &str) -> Result<bool, CacheError> {
        Ok(self.get(chart_id)?.is_some())
    }

    pub fn set(&self, chart_id: &str, payload: &ChartPayload) -> Result<(), CacheError> {
        self.write(chart_id, payload, Utc::now())
    }

    fn write(
        &self,
        chart_id: &str,
        payload: &ChartPayload,
        written_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&StoredChart {
            key: chart_id.to_string(),
            payload: payload.clone(),
            written_at,
        })?;
        let key = payload_key(chart_id);

        let _guard = self.lock_index();
        let mut index = self.load_index()?;

        match self.store.put(&key, &bytes) {
            Ok(()) => {}
            Err(e) if e.is_quota_exceeded() => {
                let evicted = self.evict_oldest(&mut index)?;
                info!(
                    "Persisted cache full, evicted {} oldest charts: {:?}",
                    evicted.len(),
                    evicted
                );
                self.save_index(&index)?;
                self.store.put(&key, &bytes)?;
            }
            Err(e) => return Err(e),
        }

        index.insert(chart_id.to_string(), written_at);
        self.save_index(&index)
    }

    /// Evict the oldest share of indexed charts. Returns the evicted ids.
    fn evict_oldest(&self, index: &mut ChartIndex) -> Result<Vec<String>, CacheError> {
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let count = ((index.len() as f64) * self.eviction_fraction).ceil() as usize;
        let count = count.clamp(1, index.len());

        let mut by_age: Vec<(DateTime<Utc>, String)> = index
            .iter()
            .map(|(id, written_at)| (*written_at, id.clone()))
            .collect();
        by_age.sort();

        let mut evicted = Vec::with_capacity(count);
        for (_, chart_id) in by_age.into_iter().take(count) {
            self.store.delete(&payload_key(&chart_id))?;
            index.remove(&chart_id);
            evicted.push(chart_id);
        }
        Ok(evicted)
    }

    pub fn remove(&self, chart_id: &str) -> Result<(), CacheError> {
        let _guard = self.lock_index();
        self.store.delete(&payload_key(chart_id))?;
        let mut index = self.load_index()?;
        if index.remove(chart_id).is_some() {
            self.save_index(&index)?;
        }
        Ok(())
    }

    /// Remove every chart payload and the index.
    pub fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.lock_index();
        for key in self.store.keys()? {
            if key.starts_with(PERSISTED_CHART_PREFIX) {
                self.store.delete(&key)?;
            }
        }
        self.store.delete(PERSISTED_INDEX_KEY)
    }

    /// Every persisted chart, oldest first.
    pub fn entries(&self) -> Result<Vec<CacheEntry<ChartPayload>>, CacheError> {
        let index = {
            let _guard = self.lock_index();
            self.load_index()?
        };

        let mut ids: Vec<(DateTime<Utc>, String)> = index
            .into_iter()
            .map(|(id, written_at)| (written_at, id))
            .collect();
        ids.sort();

        let mut entries = Vec::with_capacity(ids.len());
        for (_, chart_id) in ids {
            if let Some(entry) = self.get(&chart_id)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Number of indexed charts.
    pub fn len(&self) -> Result<usize, CacheError> {
        let _guard = self.lock_index();
        Ok(self.load_index()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}
