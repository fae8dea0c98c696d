//! Round-robin selection over API tokens

use crate::config::split_token_list;
use crate::ConfigError;
use std::sync::{Mutex, PoisonError};

/// Thread-safe round-robin cycler over a fixed list of credentials
///
/// For N tokens, N consecutive calls to [`TokenCycler::next`] return every
/// token exactly once, in the original order; the next call starts over.
#[derive(Debug)]
pub struct TokenCycler {
    tokens: Vec<String>,
    cursor: Mutex<usize>,
}

impl TokenCycler {
    /// Creates a cycler over the given tokens
    ///
    /// # Returns
    ///
    /// * `Ok(TokenCycler)` - At least one token was given
    /// * `Err(ConfigError::MissingTokens)` - The list was empty
    pub fn new(tokens: Vec<String>) -> Result<Self, ConfigError> {
        if tokens.is_empty() {
            return Err(ConfigError::MissingTokens);
        }

        Ok(Self {
            tokens,
            cursor: Mutex::new(0),
        })
    }

    /// Creates a cycler from a comma-separated list, ignoring blank entries
    pub fn from_delimited(raw: &str) -> Result<Self, ConfigError> {
        Self::new(split_token_list(raw))
    }

    /// Returns the token at the cursor and advances the cursor
    pub fn next(&self) -> &str {
        // The cursor is a plain index, a poisoned lock still holds a valid value
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let index = *cursor;
        *cursor = (index + 1) % self.tokens.len();
        &self.tokens[index]
    }

    /// Number of tokens in rotation
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
