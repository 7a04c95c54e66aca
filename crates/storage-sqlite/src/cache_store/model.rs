//! Database model for persisted cache entries.

use chrono::NaiveDateTime;
use diesel::prelude::*;

/// One opaque key/value row of the `cache_entries` table.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::cache_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CacheEntryDB {
    pub key: String,
    pub value: Vec<u8>,
    pub updated_at: NaiveDateTime,
}

impl CacheEntryDB {
    pub fn new(key: &str, value: &[u8]) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_vec(),
            updated_at: chrono::Utc::now().naive_utc(),
        }
    }
}
