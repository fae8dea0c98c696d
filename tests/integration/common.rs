//! Shared fixtures for the integration tests

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use star_crawler::crawler::{
    CrawlSettings, FetchResult, RateLimitSnapshot, RawRepositoryRecord, RetryPolicy,
    SearchCriteria, SortKey, YearMonth,
};
use star_crawler::storage::{BatchUpsertWriter, SqliteStorage};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn record(id: &str, stars: u32) -> RawRepositoryRecord {
    let ts = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
    RawRepositoryRecord {
        id: id.to_string(),
        name: format!("owner/{}", id),
        star_count: stars,
        created_at: ts,
        updated_at: ts,
    }
}

pub fn page(records: Vec<RawRepositoryRecord>, next_cursor: Option<&str>) -> FetchResult {
    FetchResult {
        records,
        has_next_page: next_cursor.is_some(),
        end_cursor: next_cursor.map(str::to_string),
        repository_count: 1000,
        rate_limit: RateLimitSnapshot {
            limit: 5000,
            cost: 1,
            remaining: 4999,
            reset_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        },
    }
}

pub fn ym(year: i32, month: u32) -> YearMonth {
    YearMonth::new(year, month).unwrap()
}

/// Settings with zero retry delays, starting at 2024-06 and never going before 2024
pub fn settings(target: u64, workers: usize, page_size: u32) -> CrawlSettings {
    CrawlSettings {
        criteria: SearchCriteria {
            min_stars: 10,
            language: None,
            keywords: vec![],
            created_after: None,
            created_before: None,
            sort: SortKey::None,
            page_size,
        },
        target,
        num_workers: workers,
        start: ym(2024, 6),
        partition_threshold: 900,
        earliest_year: Some(2024),
        retry: RetryPolicy {
            max_retries: 3,
            backoff: Duration::ZERO,
            reset_buffer: Duration::ZERO,
        },
    }
}

pub fn sqlite_writer(path: &Path) -> Arc<BatchUpsertWriter<SqliteStorage>> {
    let storage = SqliteStorage::new(path).expect("Failed to open test database");
    Arc::new(BatchUpsertWriter::new(Arc::new(Mutex::new(storage)), 3))
}

/// GraphQL response body for one page of search results
pub fn search_body(ids: &[&str], next_cursor: Option<&str>, remaining: u32, cost: u32) -> Value {
    let edges: Vec<Value> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            json!({
                "node": {
                    "id": id,
                    "nameWithOwner": format!("owner/{}", id),
                    "stargazerCount": 100 + i,
                    "createdAt": "2024-05-02T03:04:05Z",
                    "updatedAt": "2024-06-01T00:00:00Z"
                }
            })
        })
        .collect();

    json!({
        "data": {
            "rateLimit": {
                "limit": 5000,
                "cost": cost,
                "remaining": remaining,
                "resetAt": "2030-01-01T00:00:00Z"
            },
            "search": {
                "repositoryCount": 1234,
                "pageInfo": {
                    "hasNextPage": next_cursor.is_some(),
                    "endCursor": next_cursor
                },
                "edges": edges
            }
        }
    })
}
