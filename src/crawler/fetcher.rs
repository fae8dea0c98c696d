//! GitHub GraphQL search client
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with a proper user agent string
//! - Rotating API tokens across requests
//! - Parsing rate-limit metadata and the page of repositories
//! - Classifying failures into transient errors and rate-limit exhaustion

use crate::crawler::query::SearchCriteria;
use crate::crawler::tokens::TokenCycler;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// GraphQL document sent with every search request
const SEARCH_QUERY: &str = r#"
query($batch_size: Int!, $searchQuery: String!, $afterCursor: String) {
    rateLimit {
        limit
        cost
        remaining
        resetAt
    }
    search(query: $searchQuery, type: REPOSITORY, first: $batch_size, after: $afterCursor) {
        repositoryCount
        pageInfo {
            hasNextPage
            endCursor
        }
        edges {
            cursor
            node {
                ... on Repository {
                    id
                    nameWithOwner
                    stargazerCount
                    createdAt
                    updatedAt
                }
            }
        }
    }
}
"#;

/// Longest error body kept in a transient error message
const MAX_ERROR_BODY: usize = 200;

/// Errors produced by a single search request
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network, protocol or malformed-response failure; worth retrying
    #[error("Transient API error: {message}")]
    Transient { message: String },

    /// The rate-limit budget cannot cover two more queries
    #[error("Rate limit nearly exhausted ({remaining} remaining, query cost {cost}); resets at {reset_at}")]
    RateLimitNearExhaustion {
        reset_at: DateTime<Utc>,
        remaining: u32,
        cost: u32,
    },
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }
}

/// Rate-limit metadata reported with every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    pub limit: u32,
    pub cost: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitSnapshot {
    /// True when fewer points remain than two more queries of the same cost need
    pub fn is_near_exhaustion(&self) -> bool {
        self.remaining < self.cost.saturating_mul(2)
    }
}

/// One repository as reported by the search API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawRepositoryRecord {
    pub id: String,
    #[serde(rename = "nameWithOwner")]
    pub name: String,
    #[serde(rename = "stargazerCount")]
    pub star_count: u32,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// One page of search results
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Repositories in API order
    pub records: Vec<RawRepositoryRecord>,
    pub has_next_page: bool,
    /// Cursor for the next page; only valid for the query that produced it
    pub end_cursor: Option<String>,
    /// Total matches the API reports for the query
    pub repository_count: u64,
    pub rate_limit: RateLimitSnapshot,
}

/// A paged repository search source
///
/// Implemented by [`FetchClient`] for the real API.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Fetches one page of results for `criteria`, starting after `cursor`
    async fn search(
        &self,
        criteria: &SearchCriteria,
        cursor: Option<&str>,
    ) -> Result<FetchResult, FetchError>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<SearchData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    rate_limit: RateLimitSnapshot,
    search: SearchConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchConnection {
    repository_count: u64,
    page_info: PageInfo,
    #[serde(default)]
    edges: Vec<SearchEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchEdge {
    node: RawRepositoryRecord,
}

/// Builds the HTTP client used for all API requests
///
/// # Example
///
/// ```no_run
/// use star_crawler::crawler::build_http_client;
///
/// let client = build_http_client().unwrap();
/// ```
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let user_agent = format!("star-crawler/{}", env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Issues search requests against the GraphQL endpoint
pub struct FetchClient {
    client: Client,
    api_url: String,
    tokens: TokenCycler,
}

impl FetchClient {
    /// Creates a client for the given endpoint and token pool
    pub fn new(client: Client, api_url: impl Into<String>, tokens: TokenCycler) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            tokens,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl SearchApi for FetchClient {
    async fn search(
        &self,
        criteria: &SearchCriteria,
        cursor: Option<&str>,
    ) -> Result<FetchResult, FetchError> {
        let search_query = criteria.query_string();
        let token = self.tokens.next();

        tracing::debug!(query = %search_query, cursor = ?cursor, "Sending search request");

        let body = json!({
            "query": SEARCH_QUERY,
            "variables": {
                "batch_size": criteria.page_size,
                "searchQuery": search_query,
                "afterCursor": cursor,
            }
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::transient(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate(&text, MAX_ERROR_BODY)
            )));
        }

        let payload: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| FetchError::transient(format!("Malformed response body: {}", e)))?;

        let result = parse_search_response(payload)?;

        tracing::debug!(
            "Fetched {} of {} repositories (rate limit {}/{}, cost {})",
            result.records.len(),
            result.repository_count,
            result.rate_limit.remaining,
            result.rate_limit.limit,
            result.rate_limit.cost
        );

        Ok(result)
    }
}

/// Converts a decoded GraphQL payload into a page of results
///
/// GraphQL errors and a missing `data` field are transient failures. A page
/// whose rate-limit snapshot is nearly exhausted is discarded in favor of
/// [`FetchError::RateLimitNearExhaustion`].
fn parse_search_response(payload: GraphQlResponse) -> Result<FetchResult, FetchError> {
    if !payload.errors.is_empty() {
        let messages: Vec<&str> = payload.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(FetchError::transient(format!(
            "GraphQL errors: {}",
            messages.join("; ")
        )));
    }

    let data = payload
        .data
        .ok_or_else(|| FetchError::transient("Response contained no data"))?;

    let rate_limit = data.rate_limit;
    if rate_limit.is_near_exhaustion() {
        return Err(FetchError::RateLimitNearExhaustion {
            reset_at: rate_limit.reset_at,
            remaining: rate_limit.remaining,
            cost: rate_limit.cost,
        });
    }

    Ok(FetchResult {
        records: data.search.edges.into_iter().map(|e| e.node).collect(),
        has_next_page: data.search.page_info.has_next_page,
        end_cursor: data.search.page_info.end_cursor,
        repository_count: data.search.repository_count,
        rate_limit,
    })
}

fn classify_transport_error(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::transient("Request timeout")
    } else if error.is_connect() {
        FetchError::transient(format!("Connection failed: {}", error))
    } else {
        FetchError::transient(error.to_string())
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
