use crate::config::types::{Config, CrawlerConfig, GithubConfig, OutputConfig, SearchConfig};
use crate::ConfigError;
use url::Url;

/// Largest page size the search API accepts
const MAX_BATCH_SIZE: u32 = 100;

/// The search API never returns more than 1000 results for one query
const MAX_PARTITION_THRESHOLD: u64 = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_github_config(&config.github)?;
    validate_search_config(&config.search)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates GitHub access configuration
///
/// Tokens are checked when the client is built, so `stats` mode works without them.
fn validate_github_config(config: &GithubConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.api_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "api-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.tokens.iter().any(|t| t.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "tokens cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

/// Validates search filters
fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    if let (Some(after), Some(before)) = (config.created_after, config.created_before) {
        if after > before {
            return Err(ConfigError::Validation(format!(
                "created-after ({}) must not be later than created-before ({})",
                after, before
            )));
        }
    }

    Ok(())
}

/// Validates crawl pipeline configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 || config.batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::Validation(format!(
            "batch_size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, config.batch_size
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.total_num_repo < 1 {
        return Err(ConfigError::Validation(format!(
            "total_num_repo must be >= 1, got {}",
            config.total_num_repo
        )));
    }

    if config.partition_threshold < 1 || config.partition_threshold > MAX_PARTITION_THRESHOLD {
        return Err(ConfigError::Validation(format!(
            "partition_threshold must be between 1 and {}, got {}",
            MAX_PARTITION_THRESHOLD, config.partition_threshold
        )));
    }

    if config.num_threads < 1 {
        return Err(ConfigError::Validation(format!(
            "num_threads must be >= 1, got {}",
            config.num_threads
        )));
    }

    if !(1..=12).contains(&config.start_month) {
        return Err(ConfigError::Validation(format!(
            "start_month must be between 1 and 12, got {}",
            config.start_month
        )));
    }

    if config.start_year < config.earliest_year {
        return Err(ConfigError::Validation(format!(
            "start_year ({}) must not be earlier than earliest_year ({})",
            config.start_year, config.earliest_year
        )));
    }

    if config.earliest_year < 1 {
        return Err(ConfigError::Validation(format!(
            "earliest_year must be >= 1, got {}",
            config.earliest_year
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
