//! Maplister main entry point
//!
//! This is the command-line interface for the Maplister catalog mirror.

use anyhow::Context;
use clap::Parser;
use maplister::config::{load_config_with_hash, Config};
use maplister::crawler::{run_crawl, Shutdown};
use maplister::output::{load_statistics, print_report, print_statistics};
use maplister::storage::open_storage;
use maplister::Game;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Maplister: mirrors a remote map catalog into a local SQLite database
///
/// Maplister walks the catalog API category by category, stores every map
/// it finds, removes maps that are no longer listed, and keeps download
/// details up to date.
#[derive(Parser, Debug)]
#[command(name = "maplister")]
#[command(version = "1.0.0")]
#[command(about = "Mirrors a remote map catalog into SQLite", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG", required_unless_present = "list_games")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Crawl the game with this choice number instead of the configured one
    #[arg(long, value_name = "CHOICE")]
    game: Option<u32>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "list_games"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "list_games"])]
    stats: bool,

    /// List the supported games and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    list_games: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if cli.list_games {
        handle_list_games();
        return Ok(());
    }

    let config_path = cli
        .config
        .as_deref()
        .context("A configuration file is required")?;

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", config_path.display());
    let (mut config, config_hash) = load_config_with_hash(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(choice) = cli.game {
        let game = config.api.select_choice(choice)?;
        tracing::info!("Game overridden on command line: {}", game);
    }

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(config, config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("maplister=info,warn"),
            1 => EnvFilter::new("maplister=debug,info"),
            2 => EnvFilter::new("maplister=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --list-games mode
fn handle_list_games() {
    println!("Supported games:\n");
    for game in Game::all() {
        println!(
            "  {:>2}  {:<6} {} (remote id {})",
            game.choice(),
            game.slug(),
            game.name(),
            game.remote_id()
        );
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let game = config.api.game()?;

    println!("=== Maplister Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Game: {} (remote id {})", game, config.api.remote_game_id()?);
    println!("  Request timeout: {}s", config.api.request_timeout_secs);

    println!("\nCrawler Configuration:");
    println!("  Page size: {}", config.crawler.page_size);
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!(
        "  Retry delay: {}ms ({:?} backoff, max {}ms)",
        config.crawler.retry_delay_ms, config.crawler.backoff, config.crawler.max_retry_delay_ms
    );
    println!("  Workers: {}", config.crawler.workers);
    match config.crawler.download_refresh_hours {
        0 => println!("  Download details: fetched once per map"),
        hours => println!("  Download details: refreshed after {}h", hours),
    }

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    println!("✓ Would mirror the {} catalog", game);

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String) -> anyhow::Result<()> {
    let shutdown = Shutdown::new();

    // First Ctrl-C stops new branches; in-flight ones finish
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight requests");
            signal.request();
        }
    });

    match run_crawl(&config, &config_hash, shutdown).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
