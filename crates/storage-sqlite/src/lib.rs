//! SQLite storage for chartsync's persisted chart cache.
//!
//! This crate is the only place in the workspace where Diesel dependencies
//! exist. It implements the [`PersistentStore`](chartsync_core::cache::PersistentStore)
//! trait defined in `chartsync-core` on top of a single `cache_entries` table:
//! - Connection pooling with r2d2
//! - Embedded Diesel migrations
//! - An optional entry-count ceiling reported as `QuotaExceeded`
//!
//! ```text
//! chartsync-core (PersistedCache)
//!          │
//!          ▼
//!  storage-sqlite (this crate)
//!          │
//!          ▼
//!      SQLite DB
//! ```

pub mod cache_store;
pub mod db;
pub mod errors;
pub mod schema;

pub use cache_store::SqliteCacheStore;
pub use db::{create_pool, get_connection, init, run_migrations, DbConnection, DbPool};
pub use errors::StorageError;
