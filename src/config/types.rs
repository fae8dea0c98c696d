use crate::crawler::SortKey;
use chrono::NaiveDate;
use serde::Deserialize;

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// GitHub API access configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// GraphQL endpoint
    #[serde(rename = "api-url", default = "default_api_url")]
    pub api_url: String,

    /// API tokens cycled round-robin across requests
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            tokens: Vec::new(),
        }
    }
}

/// Repository search filters
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Minimum number of stars (0 disables the filter)
    #[serde(rename = "min-stars", default = "default_min_stars")]
    pub min_stars: u32,

    /// Programming language filter
    #[serde(default)]
    pub language: Option<String>,

    /// Free-text keywords added to the query
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Sort order of search results
    #[serde(rename = "sort-by", default)]
    pub sort_by: SortKey,

    /// Lower creation-date bound, used by single-fetch mode
    #[serde(rename = "created-after", default)]
    pub created_after: Option<NaiveDate>,

    /// Upper creation-date bound, used by single-fetch mode
    #[serde(rename = "created-before", default)]
    pub created_before: Option<NaiveDate>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_stars: default_min_stars(),
            language: None,
            keywords: Vec::new(),
            sort_by: SortKey::default(),
            created_after: None,
            created_before: None,
        }
    }
}

/// Crawl pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Repositories requested per page (1-100)
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: u32,

    /// Attempts per page before a partition is abandoned, and per database batch
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Target number of repositories for the whole run
    #[serde(rename = "total-num-repo", default = "default_total_num_repo")]
    pub total_num_repo: u64,

    /// Repositories fetched from one month before moving on (max 1000)
    #[serde(
        rename = "partition-threshold",
        default = "default_partition_threshold"
    )]
    pub partition_threshold: u64,

    /// Number of concurrent workers
    #[serde(rename = "num-threads", default = "default_num_threads")]
    pub num_threads: usize,

    /// Year of the first worker's starting partition
    #[serde(rename = "start-year", default = "default_start_year")]
    pub start_year: i32,

    /// Month of the first worker's starting partition
    #[serde(rename = "start-month", default = "default_start_month")]
    pub start_month: u32,

    /// Workers stop once their partition falls before January of this year
    #[serde(rename = "earliest-year", default = "default_earliest_year")]
    pub earliest_year: i32,

    /// Delay between attempts after a transient API failure (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Extra time slept past a rate-limit reset (milliseconds)
    #[serde(
        rename = "rate-limit-buffer-ms",
        default = "default_rate_limit_buffer_ms"
    )]
    pub rate_limit_buffer_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            total_num_repo: default_total_num_repo(),
            partition_threshold: default_partition_threshold(),
            num_threads: default_num_threads(),
            start_year: default_start_year(),
            start_month: default_start_month(),
            earliest_year: default_earliest_year(),
            retry_delay_ms: default_retry_delay_ms(),
            rate_limit_buffer_ms: default_rate_limit_buffer_ms(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com/graphql".to_string()
}

fn default_min_stars() -> u32 {
    10
}

fn default_batch_size() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_total_num_repo() -> u64 {
    100_000
}

fn default_partition_threshold() -> u64 {
    900
}

fn default_num_threads() -> usize {
    2
}

fn default_start_year() -> i32 {
    2025
}

fn default_start_month() -> u32 {
    6
}

fn default_earliest_year() -> i32 {
    2008
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_rate_limit_buffer_ms() -> u64 {
    1000
}

fn default_database_path() -> String {
    "./star_crawler.db".to_string()
}
