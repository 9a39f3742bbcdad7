//! Maplister: mirrors a remote map catalog into a local SQLite store
//!
//! This crate walks a paginated JSON API (catalog count, category listing,
//! per-category map pages, per-map detail and download pages), reconciles
//! what it finds against the local store, and keeps download metadata fresh.

pub mod config;
pub mod crawler;
pub mod format;
pub mod game;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Maplister operations
#[derive(Debug, Error)]
pub enum ListerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Fetch(#[from] crawler::FatalFetchError),

    #[error("{0}")]
    Parse(#[from] crawler::ParseError),

    #[error("{0}")]
    Reconcile(#[from] crawler::ReconcileError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid crawl phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CrawlPhase,
        to: state::CrawlPhase,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown game in config: {0}")]
    UnknownGame(String),
}

/// Result type alias for Maplister operations
pub type Result<T> = std::result::Result<T, ListerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use format::format_file_size;
pub use game::Game;
pub use state::{CrawlPhase, CrawlStage};
