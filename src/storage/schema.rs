//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Maplister database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Map categories mirrored from the remote catalog
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Maps mirrored from the remote catalog
CREATE TABLE IF NOT EXISTS maps (
    id TEXT PRIMARY KEY,
    category_id TEXT NOT NULL REFERENCES categories(id),
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL,
    downloads INTEGER NOT NULL,
    rating REAL NOT NULL,
    votes INTEGER NOT NULL,
    views INTEGER NOT NULL,
    download_url TEXT,
    file_size TEXT,
    download_checked_at TEXT,
    listing_hash TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_maps_category ON maps(category_id);

-- Finished crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    game TEXT NOT NULL,
    status TEXT NOT NULL,
    categories INTEGER NOT NULL DEFAULT 0,
    maps_inserted INTEGER NOT NULL DEFAULT 0,
    maps_updated INTEGER NOT NULL DEFAULT 0,
    maps_deleted INTEGER NOT NULL DEFAULT 0,
    downloads_updated INTEGER NOT NULL DEFAULT 0,
    failures INTEGER NOT NULL DEFAULT 0
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
