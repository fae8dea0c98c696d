//! Configuration module for the crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Tokens absent from the file are taken from the environment.
//!
//! # Example
//!
//! ```no_run
//! use star_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Workers: {}", config.crawler.num_threads);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, GithubConfig, OutputConfig, SearchConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, read_config, resolve_env_tokens,
    resolve_tokens_with, split_token_list, TOKEN_ENV, TOKEN_LIST_ENV,
};
pub use validation::validate;
