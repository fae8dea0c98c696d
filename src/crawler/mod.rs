//! Crawler module for repository search and ingestion
//!
//! This module contains the core crawling logic, including:
//! - Search query construction and token rotation
//! - GraphQL fetching with retry and rate-limit handling
//! - Month partition scheduling
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod query;
mod retry;
mod scheduler;
mod tokens;

pub use coordinator::{
    CrawlOrchestrator, CrawlReport, CrawlSettings, StopReason, WorkerFailure, WorkerSummary,
};
pub use fetcher::{
    build_http_client, FetchClient, FetchError, FetchResult, RateLimitSnapshot,
    RawRepositoryRecord, SearchApi,
};
pub use query::{build_search_query, SearchCriteria, SortKey};
pub use retry::{rate_limit_wait, FetchOutcome, RetryLoop, RetryPolicy, RetryState};
pub use scheduler::{advance, initial_partitions, month_range, DatePartitionScheduler, YearMonth};
pub use tokens::TokenCycler;

use crate::config::Config;
use crate::storage::{open_storage, BatchUpsertWriter, RepositoryStore, RunStatus};
use crate::CrawlerError;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Builds a search client from the GitHub section of the configuration
pub fn build_fetch_client(config: &Config) -> Result<FetchClient, CrawlerError> {
    let tokens = TokenCycler::new(config.github.tokens.clone())?;
    let client = build_http_client()?;
    Ok(FetchClient::new(client, config.github.api_url.clone(), tokens))
}

/// Runs a complete multi-worker crawl
///
/// This is the main entry point for the pipeline mode. It will:
/// 1. Open the database and record a new run
/// 2. Build the search client and the batch writer
/// 3. Run every worker to completion
/// 4. Mark the run completed, or partial if a worker failed
///
/// # Arguments
///
/// * `config` - The validated crawler configuration
/// * `config_hash` - Hash of the configuration file, stored with the run
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The run finished, possibly with failed workers
/// * `Err(CrawlerError)` - Setup failed before any worker started
pub async fn run_pipeline(config: &Config, config_hash: &str) -> Result<CrawlReport, CrawlerError> {
    let settings = CrawlSettings::from_config(config)?;
    let api = Arc::new(build_fetch_client(config)?);

    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    let run_id = storage.create_run(config_hash)?;
    tracing::info!(
        "Run {} writing to {}",
        run_id,
        config.output.database_path
    );

    let store = Arc::new(Mutex::new(storage));
    let writer = Arc::new(BatchUpsertWriter::new(
        Arc::clone(&store),
        config.crawler.max_retries,
    ));

    let report = CrawlOrchestrator::new(api, writer, settings).run().await;

    let status = if report.is_partial() {
        RunStatus::Partial
    } else {
        RunStatus::Completed
    };
    store
        .lock()
        .map_err(|_| crate::storage::StorageError::LockPoisoned)?
        .finish_run(run_id, status, report.total)?;

    tracing::info!(
        "Run {} {}: {} records",
        run_id,
        status.to_db_string(),
        report.total
    );

    Ok(report)
}

/// Fetches a single page with the configured criteria
///
/// No retries and nothing is stored. Only the configured date bounds are
/// applied; without them the query has no `created:` clause.
pub async fn run_single_fetch(config: &Config) -> Result<FetchResult, CrawlerError> {
    let criteria = SearchCriteria::from_config(&config.search, config.crawler.batch_size);
    let client = build_fetch_client(config)?;

    tracing::info!("Single fetch: {}", criteria.query_string());
    Ok(client.search(&criteria, None).await?)
}
