use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable holding a comma-separated list of tokens
pub const TOKEN_LIST_ENV: &str = "GITHUB_TOKEN_MULTI_THREAD";

/// Environment variable holding a single token
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Loads and parses a configuration file from the given path
///
/// Tokens missing from the file are resolved from the environment before the
/// configuration is validated.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut config = read_config(path)?;
    resolve_env_tokens(&mut config);

    validate(&config)?;

    Ok(config)
}

/// Reads and parses a configuration file without resolving tokens or validating
///
/// Used when command-line overrides still have to be applied before validation.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored with each crawl run so runs made with different settings can be told apart.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Splits a comma-separated token list, dropping blank entries
pub fn split_token_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fills `github.tokens` from the process environment when the file has none
pub fn resolve_env_tokens(config: &mut Config) {
    resolve_tokens_with(config, |key| std::env::var(key).ok());
}

/// Fills `github.tokens` using the given variable lookup
///
/// `GITHUB_TOKEN_MULTI_THREAD` takes precedence over `GITHUB_TOKEN`.
/// Tokens already present in the configuration are never replaced.
pub fn resolve_tokens_with<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if !config.github.tokens.is_empty() {
        return;
    }

    let tokens: Vec<String> = lookup(TOKEN_LIST_ENV)
        .or_else(|| lookup(TOKEN_ENV))
        .map(|raw| split_token_list(&raw))
        .unwrap_or_default();

    if !tokens.is_empty() {
        tracing::debug!("Resolved {} GitHub token(s) from environment", tokens.len());
    }
    config.github.tokens = tokens;
}
