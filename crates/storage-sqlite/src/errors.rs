//! Storage-specific error types for SQLite operations.
//!
//! These wrap Diesel and r2d2 failures and convert into the store-agnostic
//! [`CacheError`] that the persisted cache tier understands.

use chartsync_core::errors::CacheError;
use diesel::result::Error as DieselError;
use thiserror::Error;

/// Storage-specific errors that wrap Diesel and r2d2 types.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Database file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache table holds {used} of {capacity} entries")]
    QuotaExceeded { used: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for CacheError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::QuotaExceeded { .. } => CacheError::QuotaExceeded(err.to_string()),
            // SQLITE_FULL: the disk or the page limit is exhausted
            StorageError::QueryFailed(DieselError::DatabaseError(_, ref info))
                if info.message().contains("database or disk is full") =>
            {
                CacheError::QuotaExceeded(info.message().to_string())
            }
            other => CacheError::Storage(other.to_string()),
        }
    }
}
