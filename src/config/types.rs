use crate::game::Game;
use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Maplister
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Remote catalog API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL every endpoint path is appended to
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Game slug (e.g. "css", "tf2")
    pub game: String,

    /// Overrides the remote id from the built-in game table
    #[serde(rename = "game-id", default)]
    pub game_id: Option<u32>,

    /// Whole-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Retry delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// Delay doubles after every failed attempt
    Exponential,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of maps requested per category page
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Maximum fetch attempts per request (including the first)
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,

    /// Upper bound for exponential retry delays (milliseconds)
    #[serde(rename = "max-retry-delay-ms", default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Size of the fetch worker pool
    pub workers: u32,

    /// Re-check stored download details older than this (0 = only fetch missing ones)
    #[serde(rename = "download-refresh-hours", default)]
    pub download_refresh_hours: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retry_delay_ms() -> u64 {
    60_000
}

impl ApiConfig {
    /// Resolves the configured game slug against the game table
    pub fn game(&self) -> Result<Game, ConfigError> {
        Game::from_slug(&self.game).ok_or_else(|| ConfigError::UnknownGame(self.game.clone()))
    }

    /// Remote game id, honoring the `game-id` override
    pub fn remote_game_id(&self) -> Result<u32, ConfigError> {
        match self.game_id {
            Some(id) => Ok(id),
            None => Ok(self.game()?.remote_id()),
        }
    }

    /// Switches to the game with the given command-line choice number
    ///
    /// Clears any `game-id` override, since it belonged to the previous game.
    pub fn select_choice(&mut self, choice: u32) -> Result<Game, ConfigError> {
        let game = Game::from_choice(choice)
            .ok_or_else(|| ConfigError::UnknownGame(format!("choice {}", choice)))?;
        self.game = game.slug().to_string();
        self.game_id = None;
        Ok(game)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl CrawlerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Age after which stored download details are fetched again
    pub fn download_refresh(&self) -> Option<chrono::Duration> {
        if self.download_refresh_hours == 0 {
            return None;
        }
        i64::try_from(self.download_refresh_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
    }
}
