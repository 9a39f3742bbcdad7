//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: the run-level state machine (count, main, category pages, map details, downloads)
//! - `CrawlStage`: which fetch a request or failure belongs to
//! - `CrawlCursor`: per-category pagination position

mod cursor;
mod phase;

// Re-export main types
pub use cursor::CrawlCursor;
pub use phase::{CrawlPhase, CrawlStage};
