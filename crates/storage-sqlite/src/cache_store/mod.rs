//! SQLite implementation of the persisted cache tier's byte store.

mod model;
mod store;

pub use model::CacheEntryDB;
pub use store::SqliteCacheStore;
