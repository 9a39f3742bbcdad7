//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    CategoryRecord, MapRecord, MapSnapshot, NewRun, RunRecord, RunStatus, WriteOutcome,
};
use crate::ListerError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const UPSERT_CATEGORY_SQL: &str = "
    INSERT INTO categories (id, name, updated_at) VALUES (?1, ?2, ?3)
    ON CONFLICT(id) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at
    WHERE categories.name IS NOT excluded.name";

// Download columns are only written on insert
const UPSERT_MAP_SQL: &str = "
    INSERT INTO maps (id, category_id, name, created_at, modified_at, downloads, rating,
                      votes, views, download_url, file_size, download_checked_at,
                      listing_hash, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
    ON CONFLICT(id) DO UPDATE SET
        category_id = excluded.category_id,
        name = excluded.name,
        created_at = excluded.created_at,
        modified_at = excluded.modified_at,
        downloads = excluded.downloads,
        rating = excluded.rating,
        votes = excluded.votes,
        views = excluded.views,
        listing_hash = excluded.listing_hash,
        updated_at = excluded.updated_at
    WHERE maps.category_id IS NOT excluded.category_id
       OR maps.name IS NOT excluded.name
       OR maps.created_at IS NOT excluded.created_at
       OR maps.modified_at IS NOT excluded.modified_at
       OR maps.downloads IS NOT excluded.downloads
       OR maps.rating IS NOT excluded.rating
       OR maps.votes IS NOT excluded.votes
       OR maps.views IS NOT excluded.views
       OR maps.listing_hash IS NOT excluded.listing_hash";

const MAP_COLUMNS: &str = "id, category_id, name, created_at, modified_at, downloads, rating,
     votes, views, download_url, file_size";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ListerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ListerError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, ListerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn map_exists(&self, map_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM maps WHERE id = ?1", params![map_id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn map_from_row(row: &Row<'_>) -> rusqlite::Result<MapRecord> {
    Ok(MapRecord {
        id: row.get(0)?,
        category_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        modified_at: row.get(4)?,
        downloads: row.get(5)?,
        rating: row.get(6)?,
        votes: row.get(7)?,
        views: row.get(8)?,
        download_url: row.get(9)?,
        file_size: row.get(10)?,
    })
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Maps SQLite constraint failures (e.g. foreign keys) to a storage error
fn classify_write_error(err: rusqlite::Error) -> StorageError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StorageError::ConstraintViolation(err.to_string()),
        _ => StorageError::Sqlite(err),
    }
}

fn upsert_category_on(conn: &Connection, category: &CategoryRecord) -> StorageResult<WriteOutcome> {
    let existed: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM categories WHERE id = ?1",
            params![category.id],
            |row| row.get(0),
        )
        .optional()?;

    let now = Utc::now().to_rfc3339();
    let changed = conn
        .execute(UPSERT_CATEGORY_SQL, params![category.id, category.name, now])
        .map_err(classify_write_error)?;

    Ok(match (existed.is_some(), changed) {
        (false, _) => WriteOutcome::Inserted,
        (true, 0) => WriteOutcome::Unchanged,
        (true, _) => WriteOutcome::Updated,
    })
}

impl Storage for SqliteStorage {
    // ===== Categories =====

    fn upsert_category(&mut self, category: &CategoryRecord) -> StorageResult<WriteOutcome> {
        upsert_category_on(&self.conn, category)
    }

    fn upsert_categories(
        &mut self,
        categories: &[CategoryRecord],
    ) -> StorageResult<Vec<WriteOutcome>> {
        let tx = self.conn.transaction()?;
        let mut outcomes = Vec::with_capacity(categories.len());
        for category in categories {
            outcomes.push(upsert_category_on(&tx, category)?);
        }
        tx.commit()?;
        Ok(outcomes)
    }

    fn category_exists(&self, category_id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM categories WHERE id = ?1",
                params![category_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn list_categories(&self) -> StorageResult<Vec<CategoryRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM categories ORDER BY name")?;

        let categories = stmt
            .query_map([], |row| {
                Ok(CategoryRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(categories)
    }

    // ===== Maps =====

    fn upsert_map(&mut self, map: &MapRecord, listing_hash: &str) -> StorageResult<WriteOutcome> {
        if !self.category_exists(&map.category_id)? {
            return Err(StorageError::CategoryNotFound(map.category_id.clone()));
        }

        let existed = self.map_exists(&map.id)?;
        let now = Utc::now().to_rfc3339();
        let checked_at = map.download_url.as_ref().map(|_| now.clone());

        let changed = self
            .conn
            .execute(
                UPSERT_MAP_SQL,
                params![
                    map.id,
                    map.category_id,
                    map.name,
                    map.created_at,
                    map.modified_at,
                    map.downloads,
                    map.rating,
                    map.votes,
                    map.views,
                    map.download_url,
                    map.file_size,
                    checked_at,
                    listing_hash,
                    now
                ],
            )
            .map_err(classify_write_error)?;

        Ok(match (existed, changed) {
            (false, _) => WriteOutcome::Inserted,
            (true, 0) => WriteOutcome::Unchanged,
            (true, _) => WriteOutcome::Updated,
        })
    }

    fn update_map_download_details(
        &mut self,
        map_id: &str,
        download_url: &str,
        file_size: &str,
    ) -> StorageResult<WriteOutcome> {
        let current: Option<(Option<String>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT download_url, file_size FROM maps WHERE id = ?1",
                params![map_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (current_url, current_size) =
            current.ok_or_else(|| StorageError::MapNotFound(map_id.to_string()))?;

        let now = Utc::now().to_rfc3339();
        let unchanged = current_url.as_deref() == Some(download_url)
            && current_size.as_deref() == Some(file_size);

        if unchanged {
            // Refresh the check time only
            self.conn.execute(
                "UPDATE maps SET download_checked_at = ?1 WHERE id = ?2",
                params![now, map_id],
            )?;
            return Ok(WriteOutcome::Unchanged);
        }

        self.conn.execute(
            "UPDATE maps SET download_url = ?1, file_size = ?2, download_checked_at = ?3
             WHERE id = ?4",
            params![download_url, file_size, now, map_id],
        )?;
        Ok(WriteOutcome::Updated)
    }

    fn delete_map(&mut self, map_id: &str) -> StorageResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM maps WHERE id = ?1", params![map_id])?;
        Ok(removed > 0)
    }

    fn delete_maps(&mut self, map_ids: &[String]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM maps WHERE id = ?1")?;
            for map_id in map_ids {
                removed += stmt.execute(params![map_id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn get_map(&self, map_id: &str) -> StorageResult<Option<MapRecord>> {
        let sql = format!("SELECT {} FROM maps WHERE id = ?1", MAP_COLUMNS);
        let map = self
            .conn
            .query_row(&sql, params![map_id], map_from_row)
            .optional()?;
        Ok(map)
    }

    fn list_known_map_ids(&self, category_id: &str) -> StorageResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM maps WHERE category_id = ?1")?;

        let ids = stmt
            .query_map(params![category_id], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;

        Ok(ids)
    }

    fn map_snapshots(&self, category_id: &str) -> StorageResult<HashMap<String, MapSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, listing_hash, download_url, download_checked_at
             FROM maps WHERE category_id = ?1",
        )?;

        let snapshots = stmt
            .query_map(params![category_id], |row| {
                let id: String = row.get(0)?;
                let checked: Option<String> = row.get(3)?;
                Ok((
                    id,
                    MapSnapshot {
                        listing_hash: row.get(1)?,
                        download_url: row.get(2)?,
                        download_checked_at: parse_timestamp(checked),
                    },
                ))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(snapshots)
    }

    // ===== Runs =====

    fn record_run(&mut self, run: &NewRun) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (started_at, finished_at, config_hash, game, status, categories,
             maps_inserted, maps_updated, maps_deleted, downloads_updated, failures)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.config_hash,
                run.game,
                run.status.to_db_string(),
                run.categories as i64,
                run.maps_inserted as i64,
                run.maps_updated as i64,
                run.maps_deleted as i64,
                run.downloads_updated as i64,
                run.failures as i64
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, game, status, categories,
                 maps_inserted, maps_updated, maps_deleted, downloads_updated, failures
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        game: row.get(4)?,
                        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
                            .unwrap_or(RunStatus::Partial),
                        categories: row.get::<_, i64>(6)?.max(0) as u64,
                        maps_inserted: row.get::<_, i64>(7)?.max(0) as u64,
                        maps_updated: row.get::<_, i64>(8)?.max(0) as u64,
                        maps_deleted: row.get::<_, i64>(9)?.max(0) as u64,
                        downloads_updated: row.get::<_, i64>(10)?.max(0) as u64,
                        failures: row.get::<_, i64>(11)?.max(0) as u64,
                    })
                },
            )
            .optional()?;

        Ok(run)
    }

    // ===== Statistics =====

    fn count_categories(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM categories")
    }

    fn count_maps(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM maps")
    }

    fn count_maps_missing_downloads(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM maps WHERE download_url IS NULL")
    }

    fn count_maps_by_category(&self) -> StorageResult<HashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT category_id, COUNT(*) FROM maps GROUP BY category_id")?;

        let counts = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, count.max(0) as u64))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: &str, name: &str) -> CategoryRecord {
        CategoryRecord {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn map(id: &str, category_id: &str, name: &str) -> MapRecord {
        MapRecord {
            id: id.to_string(),
            category_id: category_id.to_string(),
            name: name.to_string(),
            created_at: 1_400_000_000,
            modified_at: 1_400_000_500,
            downloads: 10,
            rating: 8.5,
            votes: 4,
            views: 100,
            download_url: None,
            file_size: None,
        }
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_upsert_category_outcomes() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let first = storage.upsert_category(&category("1", "Bomb")).unwrap();
        let again = storage.upsert_category(&category("1", "Bomb")).unwrap();
        let renamed = storage.upsert_category(&category("1", "Defuse")).unwrap();

        assert_eq!(first, WriteOutcome::Inserted);
        assert_eq!(again, WriteOutcome::Unchanged);
        assert_eq!(renamed, WriteOutcome::Updated);
        assert_eq!(storage.list_categories().unwrap(), vec![category("1", "Defuse")]);
    }

    #[test]
    fn test_upsert_categories_batch() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let outcomes = storage
            .upsert_categories(&[category("1", "Bomb"), category("2", "Hostage")])
            .unwrap();

        assert_eq!(outcomes, vec![WriteOutcome::Inserted, WriteOutcome::Inserted]);
        assert_eq!(storage.count_categories().unwrap(), 2);
    }

    #[test]
    fn test_upsert_map_twice_keeps_one_row_with_latest_values() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_category(&category("1", "Bomb")).unwrap();

        let first = storage.upsert_map(&map("m1", "1", "de_dust"), "h1").unwrap();

        let mut changed = map("m1", "1", "de_dust2");
        changed.downloads = 99;
        let second = storage.upsert_map(&changed, "h2").unwrap();

        assert_eq!(first, WriteOutcome::Inserted);
        assert_eq!(second, WriteOutcome::Updated);
        assert_eq!(storage.count_maps().unwrap(), 1);

        let stored = storage.get_map("m1").unwrap().unwrap();
        assert_eq!(stored.name, "de_dust2");
        assert_eq!(stored.downloads, 99);
    }

    #[test]
    fn test_upsert_same_map_is_unchanged() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_category(&category("1", "Bomb")).unwrap();

        storage.upsert_map(&map("m1", "1", "de_dust"), "h1").unwrap();
        let again = storage.upsert_map(&map("m1", "1", "de_dust"), "h1").unwrap();

        assert_eq!(again, WriteOutcome::Unchanged);
    }

    #[test]
    fn test_upsert_map_without_category_is_rejected() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let result = storage.upsert_map(&map("m1", "404", "de_dust"), "h1");

        assert!(matches!(result, Err(StorageError::CategoryNotFound(id)) if id == "404"));
        assert_eq!(storage.count_maps().unwrap(), 0);
    }

    #[test]
    fn test_upsert_map_keeps_download_details() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_category(&category("1", "Bomb")).unwrap();
        storage.upsert_map(&map("m1", "1", "de_dust"), "h1").unwrap();
        storage
            .update_map_download_details("m1", "https://files.example.com/m1.zip", "1.5 MB")
            .unwrap();

        // A later listing update carries no download fields
        let mut changed = map("m1", "1", "de_dust_v2");
        changed.download_url = Some("https://elsewhere.example.com/x.zip".to_string());
        storage.upsert_map(&changed, "h2").unwrap();

        let stored = storage.get_map("m1").unwrap().unwrap();
        assert_eq!(stored.name, "de_dust_v2");
        assert_eq!(
            stored.download_url.as_deref(),
            Some("https://files.example.com/m1.zip")
        );
        assert_eq!(stored.file_size.as_deref(), Some("1.5 MB"));
    }

    #[test]
    fn test_update_download_details_leaves_listing_fields() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_category(&category("1", "Bomb")).unwrap();
        storage.upsert_map(&map("m1", "1", "de_dust"), "h1").unwrap();

        let first = storage
            .update_map_download_details("m1", "https://files.example.com/m1.zip", "2.0 KB")
            .unwrap();
        let again = storage
            .update_map_download_details("m1", "https://files.example.com/m1.zip", "2.0 KB")
            .unwrap();

        assert_eq!(first, WriteOutcome::Updated);
        assert_eq!(again, WriteOutcome::Unchanged);

        let stored = storage.get_map("m1").unwrap().unwrap();
        assert_eq!(stored, MapRecord {
            download_url: Some("https://files.example.com/m1.zip".to_string()),
            file_size: Some("2.0 KB".to_string()),
            ..map("m1", "1", "de_dust")
        });

        let snapshots = storage.map_snapshots("1").unwrap();
        assert!(snapshots["m1"].download_checked_at.is_some());
    }

    #[test]
    fn test_update_download_details_for_unknown_map() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.update_map_download_details("nope", "u", "1 B");
        assert!(matches!(result, Err(StorageError::MapNotFound(_))));
    }

    #[test]
    fn test_delete_and_known_ids() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_category(&category("1", "Bomb")).unwrap();
        storage.upsert_category(&category("2", "Hostage")).unwrap();
        for id in ["a", "b", "c"] {
            storage.upsert_map(&map(id, "1", id), "h").unwrap();
        }
        storage.upsert_map(&map("z", "2", "z"), "h").unwrap();

        assert!(storage.delete_map("b").unwrap());
        assert!(!storage.delete_map("b").unwrap());

        let known = storage.list_known_map_ids("1").unwrap();
        assert_eq!(known, HashSet::from(["a".to_string(), "c".to_string()]));

        let removed = storage
            .delete_maps(&["a".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(storage.count_maps().unwrap(), 2);
    }

    #[test]
    fn test_record_and_load_latest_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_latest_run().unwrap().is_none());

        let now = Utc::now();
        let run = NewRun {
            started_at: now,
            finished_at: now,
            config_hash: "abc".to_string(),
            game: "tf2".to_string(),
            status: RunStatus::Partial,
            categories: 3,
            maps_inserted: 10,
            maps_updated: 2,
            maps_deleted: 1,
            downloads_updated: 9,
            failures: 1,
        };
        let id = storage.record_run(&run).unwrap();

        let latest = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(latest.status, RunStatus::Partial);
        assert_eq!(latest.maps_inserted, 10);
        assert_eq!(latest.failures, 1);
    }

    #[test]
    fn test_statistics_counts() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.upsert_category(&category("1", "Bomb")).unwrap();
        storage.upsert_map(&map("a", "1", "a"), "h").unwrap();
        storage.upsert_map(&map("b", "1", "b"), "h").unwrap();
        storage.update_map_download_details("a", "u", "1 B").unwrap();

        assert_eq!(storage.count_maps_missing_downloads().unwrap(), 1);
        assert_eq!(storage.count_maps_by_category().unwrap()["1"], 2);
    }
}
