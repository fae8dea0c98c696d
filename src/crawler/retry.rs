//! Retry and rate-limit handling around search requests
//!
//! Every request runs through a small state machine:
//!
//! | From | Event | To |
//! |------|-------|----|
//! | Fetching | success | Fetching (caller advances the cursor) |
//! | Fetching | rate limit nearly exhausted | Waiting until reset + buffer, same cursor |
//! | Fetching | transient error | RetryBackoff (fixed delay), same cursor |
//! | RetryBackoff | failures reach `max_retries` | AbandonPartition |
//!
//! Rate-limit waits never count against the retry budget.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{FetchError, FetchResult, SearchApi};
use crate::crawler::query::SearchCriteria;
use crate::state::WorkerState;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Limits and delays used by [`RetryLoop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive transient failures tolerated before a partition is abandoned
    pub max_retries: u32,
    /// Delay after a transient failure
    pub backoff: Duration,
    /// Extra time slept past a rate-limit reset
    pub reset_buffer: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_delay_ms),
            reset_buffer: Duration::from_millis(config.rate_limit_buffer_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(2),
            reset_buffer: Duration::from_secs(1),
        }
    }
}

/// States of the retry state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Fetching,
    /// Sleeping until the rate-limit window resets
    Waiting { delay: Duration },
    /// Sleeping after a transient failure; `attempt` failures so far
    RetryBackoff { delay: Duration, attempt: u32 },
    /// Retries exhausted, the current partition is given up
    AbandonPartition,
}

/// Result of [`RetryLoop::fetch`]
#[derive(Debug)]
pub enum FetchOutcome {
    /// A page was fetched; `elapsed` is the duration of the successful call
    Page {
        result: FetchResult,
        elapsed: Duration,
    },
    /// Retries were exhausted for the current partition
    Abandoned { last_error: FetchError },
}

/// Drives search requests through the retry state machine
#[derive(Debug, Clone)]
pub struct RetryLoop {
    policy: RetryPolicy,
}

impl RetryLoop {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Computes the state that follows a failed request
    ///
    /// Transient errors increment the worker's failure counter; rate-limit
    /// errors leave it untouched.
    pub fn transition(
        &self,
        error: &FetchError,
        state: &mut WorkerState,
        now: DateTime<Utc>,
    ) -> RetryState {
        match error {
            FetchError::RateLimitNearExhaustion { reset_at, .. } => RetryState::Waiting {
                delay: rate_limit_wait(*reset_at, now, self.policy.reset_buffer),
            },
            FetchError::Transient { .. } => {
                let attempt = state.record_failure();
                if attempt >= self.policy.max_retries {
                    RetryState::AbandonPartition
                } else {
                    RetryState::RetryBackoff {
                        delay: self.policy.backoff,
                        attempt,
                    }
                }
            }
        }
    }

    /// Fetches the page at the worker's current cursor, retrying as needed
    ///
    /// The cursor itself is never changed here; the caller advances it once
    /// the page has been committed.
    pub async fn fetch<A>(
        &self,
        api: &A,
        criteria: &SearchCriteria,
        state: &mut WorkerState,
    ) -> FetchOutcome
    where
        A: SearchApi + ?Sized,
    {
        loop {
            let started = Instant::now();
            let error = match api.search(criteria, state.cursor.as_deref()).await {
                Ok(result) => {
                    state.record_fetch_success();
                    return FetchOutcome::Page {
                        result,
                        elapsed: started.elapsed(),
                    }
                }
                Err(error) => error,
            };

            match self.transition(&error, state, Utc::now()) {
                RetryState::Waiting { delay } => {
                    tracing::warn!(
                        "{} ({}) {}; waiting {:.1} minutes",
                        state.label(),
                        state.partition,
                        error,
                        delay.as_secs_f64() / 60.0
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryState::RetryBackoff { delay, attempt } => {
                    tracing::warn!(
                        "{} ({}) {}; retrying in {:?} (attempt {}/{})",
                        state.label(),
                        state.partition,
                        error,
                        delay,
                        attempt + 1,
                        self.policy.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryState::AbandonPartition => {
                    tracing::warn!(
                        "{} ({}) max retries reached: {}",
                        state.label(),
                        state.partition,
                        error
                    );
                    return FetchOutcome::Abandoned { last_error: error };
                }
                RetryState::Fetching => {}
            }
        }
    }
}

/// Time to sleep for a rate-limit window resetting at `reset_at`
///
/// A reset time already in the past sleeps only the buffer.
pub fn rate_limit_wait(reset_at: DateTime<Utc>, now: DateTime<Utc>, buffer: Duration) -> Duration {
    (reset_at - now).to_std().unwrap_or(Duration::ZERO) + buffer
}
