//! End-to-end runs of the pipeline and single-fetch modes against a mock endpoint

use crate::common::search_body;
use serde_json::json;
use star_crawler::config::Config;
use star_crawler::crawler::{run_pipeline, run_single_fetch};
use star_crawler::storage::{open_storage, RepositoryStore, RunStatus};
use std::path::Path;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer, db_path: &Path) -> Config {
    let mut config = Config::default();
    config.github.api_url = format!("{}/graphql", server.uri());
    config.github.tokens = vec!["test-token".to_string()];
    config.crawler.num_threads = 1;
    config.crawler.batch_size = 5;
    config.crawler.total_num_repo = 10;
    config.crawler.start_year = 2024;
    config.crawler.start_month = 6;
    config.crawler.earliest_year = 2024;
    config.crawler.retry_delay_ms = 0;
    config.crawler.rate_limit_buffer_ms = 0;
    config.output.database_path = db_path.display().to_string();
    config
}

#[tokio::test]
async fn test_pipeline_writes_repositories_and_run() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": {
                "searchQuery": "stars:>=10 created:2024-06-01..2024-06-30",
                "afterCursor": null
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
            &["R_0", "R_1", "R_2", "R_3", "R_4"],
            Some("c1"),
            4999,
            1,
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "afterCursor": "c1" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
            &["R_5", "R_6", "R_7", "R_8", "R_9"],
            None,
            4998,
            1,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("stars.db");
    let config = test_config(&server, &db_path);

    let report = run_pipeline(&config, "test-hash").await.unwrap();

    assert_eq!(report.total, 10);
    assert!(!report.is_partial());
    assert_eq!(report.fetch_ops, 2);
    assert_eq!(report.write_ops, 2);

    let storage = open_storage(&db_path).unwrap();
    assert_eq!(storage.count_records().unwrap(), 10);
    let repo = storage.get_record("R_7").unwrap().unwrap();
    assert_eq!(repo.name, "owner/R_7");
    assert_eq!(repo.star_count, 102);

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.records_fetched, 10);
}

#[tokio::test]
async fn test_pipeline_rerun_keeps_rows_unique() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(
            &["R_0", "R_1", "R_2", "R_3", "R_4"],
            None,
            4999,
            1,
        )))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("stars.db");
    let mut config = test_config(&server, &db_path);
    config.crawler.total_num_repo = 5;

    run_pipeline(&config, "first").await.unwrap();
    let second = run_pipeline(&config, "second").await.unwrap();

    assert_eq!(second.total, 5);
    let storage = open_storage(&db_path).unwrap();
    assert_eq!(storage.count_records().unwrap(), 5);
    assert_eq!(storage.get_latest_run().unwrap().unwrap().config_hash, "second");
}

#[tokio::test]
async fn test_pipeline_without_tokens_fails_before_crawling() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, &dir.path().join("stars.db"));
    config.github.tokens.clear();

    let result = run_pipeline(&config, "hash").await;

    assert!(result.is_err());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_single_fetch_without_dates_has_no_created_clause() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "variables": {
                "batch_size": 5,
                "searchQuery": "stars:>=10",
                "afterCursor": null
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&["R_1"], Some("next"), 4999, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("unused.db");
    let mut config = test_config(&server, &db_path);
    config.crawler.start_month = 2;

    let result = run_single_fetch(&config).await.unwrap();

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.end_cursor.as_deref(), Some("next"));
    assert!(!db_path.exists());
}

#[tokio::test]
async fn test_single_fetch_uses_configured_dates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "variables": { "searchQuery": "stars:>=10 created:>2023-03-01" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&[], None, 4999, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server, &dir.path().join("unused.db"));
    config.search.created_after = chrono::NaiveDate::from_ymd_opt(2023, 3, 1);

    let result = run_single_fetch(&config).await.unwrap();

    assert!(result.records.is_empty());
    assert!(!result.has_next_page);
}
