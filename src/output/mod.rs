//! Output module for crawl summaries and catalog statistics
//!
//! This module handles:
//! - Printing the summary of a finished crawl run
//! - Loading and printing statistics from an existing database

pub mod stats;

pub use stats::{load_statistics, print_statistics, CatalogStatistics};

use crate::crawler::CrawlReport;

/// Prints the summary of a finished crawl run to stdout
pub fn print_report(report: &CrawlReport) {
    let elapsed = report.finished_at - report.started_at;

    println!("=== Crawl Summary ===\n");
    println!("Game: {}", report.game);
    println!(
        "Status: {} (phase {})",
        report.status.to_db_string(),
        report.phase
    );
    println!("Duration: {}s", elapsed.num_seconds());
    if let Some(run_id) = report.run_id {
        println!("Run: #{}", run_id);
    }
    println!();

    println!("Categories:");
    println!("  Seen: {}", report.categories_seen);
    println!("  Fully crawled: {}", report.categories_completed);
    println!();

    println!("Maps:");
    println!(
        "  Seen: {} (catalog reports {})",
        report.maps_seen, report.advisory_count
    );
    println!("  Inserted: {}", report.stats.maps_inserted);
    println!("  Updated: {}", report.stats.maps_updated);
    println!("  Unchanged: {}", report.stats.maps_unchanged);
    println!("  Deleted: {}", report.stats.maps_deleted);
    println!("  Download details updated: {}", report.stats.downloads_updated);
    println!();

    if report.failures.is_empty() && report.panicked == 0 {
        println!("No failed branches");
        return;
    }

    println!(
        "Failed Branches ({}):",
        report.failures.len() as u64 + report.panicked
    );
    for failure in &report.failures {
        println!("  - {} ({}): {}", failure.stage, failure.url, failure.error);
    }
    if report.panicked > 0 {
        println!("  - {} branch task(s) panicked", report.panicked);
    }
}
