//! Storage module for the local catalog mirror
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Category and map upserts keyed by remote id
//! - Download detail updates that never touch listing fields
//! - Crawl run bookkeeping

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::ListerError;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, ListerError> {
    SqliteStorage::new(path)
}

/// A map category, keyed by its remote id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
}

/// A mirrored map, keyed by its remote id
#[derive(Debug, Clone, PartialEq)]
pub struct MapRecord {
    pub id: String,
    pub category_id: String,
    pub name: String,
    /// Creation time (unix seconds)
    pub created_at: i64,
    /// Last modification time (unix seconds)
    pub modified_at: i64,
    pub downloads: i64,
    pub rating: f64,
    pub votes: i64,
    pub views: i64,
    pub download_url: Option<String>,
    /// Human-readable size, e.g. "1.5 MB"
    pub file_size: Option<String>,
}

/// Stored state of a map used to classify a fresh listing entry
#[derive(Debug, Clone, PartialEq)]
pub struct MapSnapshot {
    pub listing_hash: String,
    pub download_url: Option<String>,
    pub download_checked_at: Option<DateTime<Utc>>,
}

impl MapSnapshot {
    /// Returns true if download details should be fetched for this map
    ///
    /// Missing details are always fetched; present ones only once they are
    /// older than `refresh_after`.
    pub fn needs_download(&self, refresh_after: Option<chrono::Duration>, now: DateTime<Utc>) -> bool {
        if self.download_url.is_none() {
            return true;
        }

        match (refresh_after, self.download_checked_at) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(max_age), Some(checked)) => now - checked >= max_age,
        }
    }
}

/// Effect of an idempotent write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl WriteOutcome {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Represents a finished crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: String,
    pub config_hash: String,
    pub game: String,
    pub status: RunStatus,
    pub categories: u64,
    pub maps_inserted: u64,
    pub maps_updated: u64,
    pub maps_deleted: u64,
    pub downloads_updated: u64,
    pub failures: u64,
}

/// Values recorded for a run once it reaches `Done`
#[derive(Debug, Clone)]
pub struct NewRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config_hash: String,
    pub game: String,
    pub status: RunStatus,
    pub categories: u64,
    pub maps_inserted: u64,
    pub maps_updated: u64,
    pub maps_deleted: u64,
    pub downloads_updated: u64,
    pub failures: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every branch finished
    Completed,
    /// At least one branch failed terminally
    Partial,
    /// Shutdown was requested before all branches ran
    Interrupted,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[RunStatus::Completed, RunStatus::Partial, RunStatus::Interrupted] {
            let db_str = status.to_db_string();
            let parsed = RunStatus::from_db_string(db_str);
            assert_eq!(Some(*status), parsed);
        }
    }

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("running"), None);
    }

    fn snapshot(url: Option<&str>, checked_hours_ago: Option<i64>, now: DateTime<Utc>) -> MapSnapshot {
        MapSnapshot {
            listing_hash: "h".to_string(),
            download_url: url.map(str::to_string),
            download_checked_at: checked_hours_ago.map(|h| now - chrono::Duration::hours(h)),
        }
    }

    #[test]
    fn test_missing_download_always_needed() {
        let now = Utc::now();
        assert!(snapshot(None, None, now).needs_download(None, now));
        assert!(snapshot(None, Some(1), now).needs_download(Some(chrono::Duration::hours(24)), now));
    }

    #[test]
    fn test_known_download_without_refresh_policy() {
        let now = Utc::now();
        assert!(!snapshot(Some("u"), Some(10_000), now).needs_download(None, now));
    }

    #[test]
    fn test_known_download_refresh_window() {
        let now = Utc::now();
        let day = Some(chrono::Duration::hours(24));
        assert!(!snapshot(Some("u"), Some(2), now).needs_download(day, now));
        assert!(snapshot(Some("u"), Some(30), now).needs_download(day, now));
        assert!(snapshot(Some("u"), None, now).needs_download(day, now));
    }
}
