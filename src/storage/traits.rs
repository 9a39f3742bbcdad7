//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{CategoryRecord, MapRecord, MapSnapshot, NewRun, RunRecord, WriteOutcome};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Map not found: {0}")]
    MapNotFound(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every write is keyed by remote id and idempotent: repeating a write with the
/// same values reports [`WriteOutcome::Unchanged`] and leaves the row untouched.
/// Callers serialize access; implementations are single-writer.
pub trait Storage: Send {
    // ===== Categories =====

    /// Inserts a category or renames an existing one
    fn upsert_category(&mut self, category: &CategoryRecord) -> StorageResult<WriteOutcome>;

    /// Upserts a batch of categories in a single transaction
    fn upsert_categories(&mut self, categories: &[CategoryRecord])
        -> StorageResult<Vec<WriteOutcome>>;

    fn category_exists(&self, category_id: &str) -> StorageResult<bool>;

    fn list_categories(&self) -> StorageResult<Vec<CategoryRecord>>;

    // ===== Maps =====

    /// Inserts or updates a map's listing fields
    ///
    /// Download fields are written on insert only; an update never changes
    /// `download_url` or `file_size`. Fails with
    /// [`StorageError::CategoryNotFound`] if the map's category is not stored.
    fn upsert_map(&mut self, map: &MapRecord, listing_hash: &str) -> StorageResult<WriteOutcome>;

    /// Updates only the download fields of an existing map
    fn update_map_download_details(
        &mut self,
        map_id: &str,
        download_url: &str,
        file_size: &str,
    ) -> StorageResult<WriteOutcome>;

    /// Deletes a map; returns false if it was not stored
    fn delete_map(&mut self, map_id: &str) -> StorageResult<bool>;

    /// Deletes several maps in a single transaction; returns the number removed
    fn delete_maps(&mut self, map_ids: &[String]) -> StorageResult<usize>;

    fn get_map(&self, map_id: &str) -> StorageResult<Option<MapRecord>>;

    /// Ids of every map stored under a category
    fn list_known_map_ids(&self, category_id: &str) -> StorageResult<HashSet<String>>;

    /// Classification state of every map stored under a category
    fn map_snapshots(&self, category_id: &str) -> StorageResult<HashMap<String, MapSnapshot>>;

    // ===== Runs =====

    fn record_run(&mut self, run: &NewRun) -> StorageResult<i64>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Statistics =====

    fn count_categories(&self) -> StorageResult<u64>;

    fn count_maps(&self) -> StorageResult<u64>;

    /// Maps that have no download details yet
    fn count_maps_missing_downloads(&self) -> StorageResult<u64>;

    /// Map count per category id
    fn count_maps_by_category(&self) -> StorageResult<HashMap<String, u64>>;
}
