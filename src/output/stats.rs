//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! mirror statistics from the storage layer.

use crate::storage::{RunRecord, Storage};
use crate::ListerError;

/// Catalog mirror statistics
#[derive(Debug, Clone)]
pub struct CatalogStatistics {
    pub total_categories: u64,
    pub total_maps: u64,

    /// Maps whose download details have not been fetched yet
    pub maps_missing_downloads: u64,

    /// Map count per category as (id, name, count), largest first
    pub maps_by_category: Vec<(String, String, u64)>,

    /// Most recently recorded crawl run
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CatalogStatistics)` - Successfully loaded statistics
/// * `Err(ListerError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CatalogStatistics, ListerError> {
    let total_categories = storage.count_categories()?;
    let total_maps = storage.count_maps()?;
    let maps_missing_downloads = storage.count_maps_missing_downloads()?;
    let counts = storage.count_maps_by_category()?;

    let mut maps_by_category: Vec<_> = storage
        .list_categories()?
        .into_iter()
        .map(|category| {
            let count = counts.get(&category.id).copied().unwrap_or(0);
            (category.id, category.name, count)
        })
        .collect();
    maps_by_category.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

    let latest_run = storage.get_latest_run()?;

    Ok(CatalogStatistics {
        total_categories,
        total_maps,
        maps_missing_downloads,
        maps_by_category,
        latest_run,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CatalogStatistics) {
    println!("=== Catalog Statistics ===\n");

    println!("Overview:");
    println!("  Categories: {}", stats.total_categories);
    println!("  Maps: {}", stats.total_maps);
    println!("  Maps without download details: {}", stats.maps_missing_downloads);
    println!();

    if !stats.maps_by_category.is_empty() {
        println!("Maps by Category:");
        for (id, name, count) in &stats.maps_by_category {
            let percentage = if stats.total_maps > 0 {
                (*count as f64 / stats.total_maps as f64) * 100.0
            } else {
                0.0
            };
            println!("  {} [{}]: {} ({:.1}%)", name, id, count, percentage);
        }
        println!();
    }

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run (#{}):", run.id);
            println!("  Game: {}", run.game);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            println!("  Finished: {}", run.finished_at);
            println!(
                "  Maps: {} inserted, {} updated, {} deleted",
                run.maps_inserted, run.maps_updated, run.maps_deleted
            );
            println!("  Downloads updated: {}", run.downloads_updated);
            println!("  Failed branches: {}", run.failures);
        }
        None => println!("No crawl runs recorded yet"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CategoryRecord, MapRecord, SqliteStorage};

    fn map(id: &str, category_id: &str) -> MapRecord {
        MapRecord {
            id: id.to_string(),
            category_id: category_id.to_string(),
            name: id.to_string(),
            created_at: 0,
            modified_at: 0,
            downloads: 0,
            rating: 0.0,
            votes: 0,
            views: 0,
            download_url: None,
            file_size: None,
        }
    }

    #[test]
    fn test_load_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .upsert_categories(&[
                CategoryRecord {
                    id: "1".to_string(),
                    name: "Bomb".to_string(),
                },
                CategoryRecord {
                    id: "2".to_string(),
                    name: "Hostage".to_string(),
                },
            ])
            .unwrap();
        storage.upsert_map(&map("a", "2"), "h").unwrap();
        storage.upsert_map(&map("b", "2"), "h").unwrap();
        storage.upsert_map(&map("c", "1"), "h").unwrap();
        storage
            .update_map_download_details("c", "https://files/c.zip", "1.0 KB")
            .unwrap();

        let stats = load_statistics(&storage).unwrap();

        assert_eq!(stats.total_categories, 2);
        assert_eq!(stats.total_maps, 3);
        assert_eq!(stats.maps_missing_downloads, 2);
        assert_eq!(
            stats.maps_by_category,
            vec![
                ("2".to_string(), "Hostage".to_string(), 2),
                ("1".to_string(), "Bomb".to_string(), 1),
            ]
        );
        assert!(stats.latest_run.is_none());
    }
}
