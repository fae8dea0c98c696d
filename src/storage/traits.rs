//! Storage traits and error types
//!
//! This module defines the trait interface for repository stores and
//! associated error types.

use crate::storage::{PersistedRecord, RunRecord, RunStatus};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned by a panicking worker")]
    LockPoisoned,

    #[error("Invalid timestamp in database: {0}")]
    InvalidTimestamp(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for repository store implementations
///
/// Stores are shared between workers behind an `Arc<Mutex<_>>`, so every
/// implementation must be `Send`.
pub trait RepositoryStore: Send {
    // ===== Repository records =====

    /// Looks up which of `ids` are already stored
    ///
    /// # Returns
    ///
    /// A map from id to the stored record; ids not in the store are absent.
    fn find_existing(&self, ids: &[String]) -> StorageResult<HashMap<String, PersistedRecord>>;

    /// Inserts and updates records inside a single transaction
    ///
    /// Either every row is written or none is.
    fn apply_changes(
        &mut self,
        inserts: &[PersistedRecord],
        updates: &[PersistedRecord],
    ) -> StorageResult<()>;

    /// Gets one record by id
    fn get_record(&self, id: &str) -> StorageResult<Option<PersistedRecord>>;

    /// Total number of stored repositories
    fn count_records(&self) -> StorageResult<u64>;

    /// The `limit` repositories with the most stars
    fn top_starred(&self, limit: usize) -> StorageResult<Vec<PersistedRecord>>;

    // ===== Run tracking =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Sets the final status of a run, with a finish timestamp
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        records_fetched: u64,
    ) -> StorageResult<()>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;
}
