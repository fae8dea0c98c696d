//! Star Crawler main entry point
//!
//! This is the command-line interface for the concurrent GitHub repository crawler.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use star_crawler::config::{self, Config};
use star_crawler::crawler::{run_pipeline, run_single_fetch, SortKey};
use star_crawler::output::{load_statistics, print_fetch_summary, print_run_report, print_statistics};
use star_crawler::storage::SqliteStorage;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Number of repositories listed by the stats mode
const STATS_TOP_N: usize = 10;

/// What the crawler should do
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Multi-worker crawl into the database
    Pipeline,
    /// One search request, printed and discarded
    Single,
    /// Print statistics from the database and exit
    Stats,
}

/// Star Crawler: concurrent GitHub repository crawler
///
/// Pages through GitHub's repository search with a pool of workers, one
/// calendar month at a time, and stores star counts in SQLite.
#[derive(Parser, Debug)]
#[command(name = "star-crawler")]
#[command(version = "1.0.0")]
#[command(about = "Concurrent GitHub repository crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults are used when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Mode::Pipeline)]
    mode: Mode,

    /// Number of concurrent workers
    #[arg(long)]
    num_threads: Option<usize>,

    /// Stop once this many repositories have been fetched
    #[arg(long)]
    total_num_repo: Option<u64>,

    /// Records per page (1-100)
    #[arg(long)]
    batch_size: Option<u32>,

    #[arg(long)]
    min_stars: Option<u32>,

    #[arg(long)]
    language: Option<String>,

    /// Search keyword, may be repeated
    #[arg(long = "keyword")]
    keywords: Vec<String>,

    #[arg(long, value_enum)]
    sort_by: Option<SortKey>,

    /// Only repositories created on or after this date (YYYY-MM-DD)
    #[arg(long)]
    created_after: Option<NaiveDate>,

    /// Only repositories created on or before this date (YYYY-MM-DD)
    #[arg(long)]
    created_before: Option<NaiveDate>,

    /// Year of the first worker's partition
    #[arg(long)]
    start_year: Option<i32>,

    /// Month of the first worker's partition
    #[arg(long)]
    start_month: Option<u32>,

    /// Records per month before a worker moves to the previous month
    #[arg(long)]
    partition_threshold: Option<u64>,

    /// SQLite database path
    #[arg(long)]
    database: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(n) = self.num_threads {
            config.crawler.num_threads = n;
        }
        if let Some(n) = self.total_num_repo {
            config.crawler.total_num_repo = n;
        }
        if let Some(n) = self.batch_size {
            config.crawler.batch_size = n;
        }
        if let Some(y) = self.start_year {
            config.crawler.start_year = y;
        }
        if let Some(m) = self.start_month {
            config.crawler.start_month = m;
        }
        if let Some(n) = self.partition_threshold {
            config.crawler.partition_threshold = n;
        }
        if let Some(stars) = self.min_stars {
            config.search.min_stars = stars;
        }
        if let Some(language) = &self.language {
            config.search.language = Some(language.clone());
        }
        if !self.keywords.is_empty() {
            config.search.keywords = self.keywords.clone();
        }
        if let Some(sort) = self.sort_by {
            config.search.sort_by = sort;
        }
        if self.created_after.is_some() {
            config.search.created_after = self.created_after;
        }
        if self.created_before.is_some() {
            config.search.created_before = self.created_before;
        }
        if let Some(path) = &self.database {
            config.output.database_path = path.display().to_string();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let (config, config_hash) = load_configuration(&cli)?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    match cli.mode {
        Mode::Pipeline => handle_pipeline(&config, &config_hash).await,
        Mode::Single => handle_single(&config).await,
        Mode::Stats => handle_stats(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("star_crawler=info,warn"),
            1 => EnvFilter::new("star_crawler=debug,info"),
            2 => EnvFilter::new("star_crawler=trace,debug"),
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

/// Loads the file (or defaults), applies flags and validates the result
fn load_configuration(cli: &Cli) -> anyhow::Result<(Config, String)> {
    let (mut config, hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let config = config::read_config(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            let hash = config::compute_config_hash(path)?;
            (config, hash)
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            (Config::default(), "defaults".to_string())
        }
    };

    config::resolve_env_tokens(&mut config);
    cli.apply_overrides(&mut config);
    config::validate(&config).context("Invalid configuration")?;

    tracing::debug!("Configuration ready (hash: {})", hash);
    Ok((config, hash))
}

/// Handles the --dry-run flag: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Star Crawler Dry Run ===\n");

    println!("GitHub:");
    println!("  API URL: {}", config.github.api_url);
    println!("  Tokens: {}", config.github.tokens.len());

    println!("\nSearch:");
    println!("  Min stars: {}", config.search.min_stars);
    println!(
        "  Language: {}",
        config.search.language.as_deref().unwrap_or("(any)")
    );
    println!("  Keywords: {:?}", config.search.keywords);
    println!("  Sort: {:?}", config.search.sort_by);

    println!("\nCrawler:");
    println!("  Workers: {}", config.crawler.num_threads);
    println!("  Target: {}", config.crawler.total_num_repo);
    println!("  Batch size: {}", config.crawler.batch_size);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!(
        "  Start partition: {}-{:02}",
        config.crawler.start_year, config.crawler.start_month
    );
    println!("  Partition threshold: {}", config.crawler.partition_threshold);
    println!("  Earliest year: {}", config.crawler.earliest_year);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    if config.github.tokens.is_empty() {
        println!("✗ No GitHub tokens configured; pipeline and single modes will fail");
    }
}

/// Handles the pipeline mode: runs every worker and prints the summary
async fn handle_pipeline(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    let report = run_pipeline(config, config_hash)
        .await
        .context("Crawl failed")?;

    print_run_report(&report);

    if report.workers.is_empty() && report.is_partial() {
        bail!("every worker failed");
    }
    Ok(())
}

/// Handles the single mode: one request, no persistence
async fn handle_single(config: &Config) -> anyhow::Result<()> {
    let result = run_single_fetch(config)
        .await
        .context("Single fetch failed")?;
    print_fetch_summary(&result);
    Ok(())
}

/// Handles the stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage, STATS_TOP_N)?;

    print_statistics(&stats);

    Ok(())
}
