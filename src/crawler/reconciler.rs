//! Reconciler between parsed pages and the local store
//!
//! The reconciler is the only path from the crawl pipeline to storage. It
//! owns the store behind a single mutex, so every write is serialized no
//! matter how many branches produced it. Crawl counters live under the same
//! lock.

use crate::crawler::progress::CrawlStats;
use crate::format::format_file_size;
use crate::storage::{
    CategoryRecord, MapRecord, MapSnapshot, NewRun, Storage, StorageError, StorageResult,
    WriteOutcome,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// A store operation that failed for one remote record
#[derive(Debug, Error)]
#[error("{operation} failed for {remote_id}: {source}")]
pub struct ReconcileError {
    pub operation: &'static str,
    pub remote_id: String,
    pub source: StorageError,
}

/// What a listing entry requires, compared to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Not stored yet
    Insert,
    /// Stored with a different listing fingerprint
    Update,
    /// Stored with the same fingerprint; nothing to fetch or write
    Unchanged,
}

impl ReconcileAction {
    /// Classifies a listing entry against its stored snapshot
    pub fn classify(snapshot: Option<&MapSnapshot>, fingerprint: &str) -> Self {
        match snapshot {
            None => Self::Insert,
            Some(s) if s.listing_hash == fingerprint => Self::Unchanged,
            Some(_) => Self::Update,
        }
    }
}

struct Ledger {
    storage: Box<dyn Storage>,
    stats: CrawlStats,
}

impl Ledger {
    fn count_category(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Inserted => self.stats.categories_inserted += 1,
            WriteOutcome::Updated => self.stats.categories_updated += 1,
            WriteOutcome::Unchanged => {}
        }
    }
}

/// Applies inserts, updates and deletes to the store
pub struct Reconciler {
    ledger: Mutex<Ledger>,
}

impl Reconciler {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                storage,
                stats: CrawlStats::default(),
            }),
        }
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Ledger>> {
        self.ledger.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Runs one store operation under the lock, logging any failure
    fn apply<T>(
        &self,
        operation: &'static str,
        remote_id: &str,
        f: impl FnOnce(&mut Ledger) -> StorageResult<T>,
    ) -> Result<T, ReconcileError> {
        let result = self.lock().and_then(|mut ledger| f(&mut ledger));

        result.map_err(|source| {
            tracing::error!("Store {} failed for {}: {}", operation, remote_id, source);
            ReconcileError {
                operation,
                remote_id: remote_id.to_string(),
                source,
            }
        })
    }

    /// Upserts every category from the main listing
    ///
    /// Runs before any map of this crawl is written.
    pub fn upsert_categories(&self, categories: &[CategoryRecord]) -> Result<(), ReconcileError> {
        self.apply("upsert categories", "main listing", |ledger| {
            for outcome in ledger.storage.upsert_categories(categories)? {
                ledger.count_category(outcome);
            }
            Ok(())
        })
    }

    pub fn upsert_category(&self, category: &CategoryRecord) -> Result<WriteOutcome, ReconcileError> {
        self.apply("upsert category", &category.id, |ledger| {
            let outcome = ledger.storage.upsert_category(category)?;
            ledger.count_category(outcome);
            Ok(outcome)
        })
    }

    /// Stored state of every map in a category, used for classification
    pub fn snapshots(&self, category_id: &str) -> Result<HashMap<String, MapSnapshot>, ReconcileError> {
        self.apply("load snapshots", category_id, |ledger| {
            ledger.storage.map_snapshots(category_id)
        })
    }

    /// Counts listing entries that needed no work
    pub fn note_unchanged(&self, count: u64) {
        if let Ok(mut ledger) = self.lock() {
            ledger.stats.maps_unchanged += count;
        }
    }

    /// Upserts a map's listing fields
    ///
    /// The store rejects a map whose category is not stored, so an orphan
    /// row is never written.
    pub fn upsert_map(&self, map: &MapRecord, fingerprint: &str) -> Result<WriteOutcome, ReconcileError> {
        self.apply("upsert map", &map.id, |ledger| {
            let outcome = ledger.storage.upsert_map(map, fingerprint)?;
            match outcome {
                WriteOutcome::Inserted => ledger.stats.maps_inserted += 1,
                WriteOutcome::Updated => ledger.stats.maps_updated += 1,
                WriteOutcome::Unchanged => ledger.stats.maps_unchanged += 1,
            }
            Ok(outcome)
        })
    }

    /// Stores a map's download url and its formatted size
    pub fn update_download_details(
        &self,
        map_id: &str,
        url: &str,
        size_bytes: u64,
    ) -> Result<WriteOutcome, ReconcileError> {
        let file_size = format_file_size(size_bytes);

        self.apply("update download details", map_id, |ledger| {
            let outcome = ledger
                .storage
                .update_map_download_details(map_id, url, &file_size)?;
            if outcome.is_mutation() {
                ledger.stats.downloads_updated += 1;
            }
            Ok(outcome)
        })
    }

    /// Deletes stored maps of a category that the finished crawl did not see
    ///
    /// Must only be called once the category's whole page loop has ended
    /// normally. Returns the deleted ids.
    pub fn reconcile_category(
        &self,
        category_id: &str,
        seen: &HashSet<String>,
    ) -> Result<Vec<String>, ReconcileError> {
        self.apply("reconcile category", category_id, |ledger| {
            let known = ledger.storage.list_known_map_ids(category_id)?;
            let mut stale: Vec<String> = known.difference(seen).cloned().collect();
            stale.sort();

            if stale.is_empty() {
                return Ok(stale);
            }

            let deleted = ledger.storage.delete_maps(&stale)?;
            ledger.stats.maps_deleted += deleted as u64;
            tracing::info!(
                "Category {}: deleted {} map(s) no longer listed",
                category_id,
                deleted
            );
            Ok(stale)
        })
    }

    pub fn record_run(&self, run: &NewRun) -> Result<i64, ReconcileError> {
        self.apply("record run", run.game.as_str(), |ledger| {
            ledger.storage.record_run(run)
        })
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> CrawlStats {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }

    /// Runs a read-only query against the store
    pub fn read<T>(&self, f: impl FnOnce(&dyn Storage) -> StorageResult<T>) -> StorageResult<T> {
        let ledger = self.lock()?;
        f(ledger.storage.as_ref())
    }
}
