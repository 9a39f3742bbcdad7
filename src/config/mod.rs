//! Configuration module for Maplister
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use maplister::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("maplister.toml")).unwrap();
//! println!("Fetching {} maps per page", config.crawler.page_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiConfig, Backoff, Config, CrawlerConfig, OutputConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
