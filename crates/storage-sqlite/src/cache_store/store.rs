use diesel::prelude::*;
use log::{debug, info};
use std::sync::Arc;

use super::model::CacheEntryDB;
use crate::db::{create_pool, get_connection, init, run_migrations, DbPool};
use crate::errors::{Result, StorageError};
use crate::schema::cache_entries::dsl as entries_dsl;
use chartsync_core::cache::PersistentStore;
use chartsync_core::errors::CacheError;

/// [`PersistentStore`] over the `cache_entries` table.
///
/// With a capacity set, the table holds at most that many keys: writing a new
/// key into a full table fails with [`CacheError::QuotaExceeded`], while
/// overwriting an existing key always succeeds.
pub struct SqliteCacheStore {
    pool: Arc<DbPool>,
    capacity: Option<usize>,
}

impl SqliteCacheStore {
    pub fn new(pool: Arc<DbPool>, capacity: Option<usize>) -> Self {
        SqliteCacheStore { pool, capacity }
    }

    /// Open (creating if needed) the database at `db_path` and apply migrations.
    pub fn open(db_path: &str, capacity: Option<usize>) -> Result<Self> {
        init(db_path)?;
        let pool = create_pool(db_path)?;
        run_migrations(&pool)?;
        info!(
            "Opened chart cache at {} (capacity: {})",
            db_path,
            capacity.map_or_else(|| "unbounded".to_string(), |c| c.to_string())
        );
        Ok(Self::new(pool, capacity))
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of stored keys.
    pub fn len(&self) -> Result<usize> {
        let mut conn = get_connection(&self.pool)?;
        let count: i64 = entries_dsl::cache_entries.count().get_result(&mut conn)?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn get_entry(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = get_connection(&self.pool)?;
        let value = entries_dsl::cache_entries
            .filter(entries_dsl::key.eq(key))
            .select(entries_dsl::value)
            .first::<Vec<u8>>(&mut conn)
            .optional()?;
        Ok(value)
    }

    fn put_entry(&self, key: &str, value: &[u8]) -> Result<()> {
        let row = CacheEntryDB::new(key, value);
        let capacity = self.capacity;
        let mut conn = get_connection(&self.pool)?;

        // The capacity check and the write share one write lock.
        conn.immediate_transaction::<_, StorageError, _>(|c| {
            if let Some(capacity) = capacity {
                let exists: bool = diesel::select(diesel::dsl::exists(
                    entries_dsl::cache_entries.filter(entries_dsl::key.eq(&row.key)),
                ))
                .get_result(c)?;

                if !exists {
                    let used: i64 = entries_dsl::cache_entries.count().get_result(c)?;
                    let used = used as usize;
                    if used >= capacity {
                        debug!("Rejecting new cache key {}: table is full", row.key);
                        return Err(StorageError::QuotaExceeded { used, capacity });
                    }
                }
            }

            diesel::replace_into(entries_dsl::cache_entries)
                .values(&row)
                .execute(c)?;
            Ok(())
        })
    }

    fn delete_entry(&self, key: &str) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        diesel::delete(entries_dsl::cache_entries.filter(entries_dsl::key.eq(key)))
            .execute(&mut conn)?;
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let keys = entries_dsl::cache_entries
            .select(entries_dsl::key)
            .order(entries_dsl::key.asc())
            .load::<String>(&mut conn)?;
        Ok(keys)
    }
}

impl PersistentStore for SqliteCacheStore {
    fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, CacheError> {
        Ok(self.get_entry(key)?)
    }

    fn put(&self, key: &str, value: &[u8]) -> std::result::Result<(), CacheError> {
        Ok(self.put_entry(key, value)?)
    }

    fn delete(&self, key: &str) -> std::result::Result<(), CacheError> {
        Ok(self.delete_entry(key)?)
    }

    fn keys(&self) -> std::result::Result<Vec<String>, CacheError> {
        Ok(self.list_keys()?)
    }
}
