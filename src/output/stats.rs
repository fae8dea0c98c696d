//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! repository statistics from the storage layer.

use crate::storage::{PersistedRecord, RepositoryStore, RunRecord, StorageResult};

/// Stored-repository statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of stored repositories
    pub total_repositories: u64,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Repositories with the most stars, highest first
    pub top_starred: Vec<PersistedRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `top` - How many of the most-starred repositories to include
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics<S>(storage: &S, top: usize) -> StorageResult<CrawlStatistics>
where
    S: RepositoryStore + ?Sized,
{
    Ok(CrawlStatistics {
        total_repositories: storage.count_records()?,
        latest_run: storage.get_latest_run()?,
        top_starred: storage.top_starred(top)?,
    })
}

/// Renders statistics as the text printed by [`print_statistics`]
pub fn format_statistics(stats: &CrawlStatistics) -> String {
    let mut out = String::from("=== Crawl Statistics ===\n\n");

    out.push_str(&format!(
        "Stored repositories: {}\n\n",
        stats.total_repositories
    ));

    match &stats.latest_run {
        Some(run) => {
            out.push_str("Latest run:\n");
            out.push_str(&format!("  Id: {}\n", run.id));
            out.push_str(&format!("  Status: {}\n", run.status.to_db_string()));
            out.push_str(&format!("  Started: {}\n", run.started_at));
            if let Some(finished) = &run.finished_at {
                out.push_str(&format!("  Finished: {}\n", finished));
            }
            out.push_str(&format!("  Records fetched: {}\n\n", run.records_fetched));
        }
        None => out.push_str("No runs recorded\n\n"),
    }

    if !stats.top_starred.is_empty() {
        out.push_str(&format!("Top {} by stars:\n", stats.top_starred.len()));
        for (rank, repo) in stats.top_starred.iter().enumerate() {
            out.push_str(&format!(
                "  {:>3}. {} ({} stars)\n",
                rank + 1,
                repo.name,
                repo.star_count
            ));
        }
    }

    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    print!("{}", format_statistics(stats));
}
