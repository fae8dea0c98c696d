//! FetchClient against a mock GraphQL endpoint

use crate::common::search_body;
use serde_json::json;
use star_crawler::crawler::{
    build_http_client, FetchClient, FetchError, SearchApi, SearchCriteria, SortKey, TokenCycler,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn criteria() -> SearchCriteria {
    SearchCriteria {
        min_stars: 10,
        language: Some("rust".to_string()),
        keywords: vec![],
        created_after: None,
        created_before: None,
        sort: SortKey::None,
        page_size: 2,
    }
}

fn client_for(server: &MockServer, tokens: &[&str]) -> FetchClient {
    let tokens = TokenCycler::new(tokens.iter().map(|t| t.to_string()).collect()).unwrap();
    FetchClient::new(
        build_http_client().unwrap(),
        format!("{}/graphql", server.uri()),
        tokens,
    )
}

#[tokio::test]
async fn test_fetch_parses_page() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": {
                "batch_size": 2,
                "searchQuery": "language:rust stars:>=10",
                "afterCursor": null
            }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(search_body(&["R_1", "R_2"], Some("c1"), 4999, 1)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &["t1"]);
    let result = client.search(&criteria(), None).await.unwrap();

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.records[0].id, "R_1");
    assert_eq!(result.records[0].name, "owner/R_1");
    assert_eq!(result.records[1].star_count, 101);
    assert!(result.has_next_page);
    assert_eq!(result.end_cursor.as_deref(), Some("c1"));
    assert_eq!(result.repository_count, 1234);
    assert_eq!(result.rate_limit.remaining, 4999);
}

#[tokio::test]
async fn test_cursor_is_sent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "variables": { "afterCursor": "c1" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&["R_3"], None, 4998, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &["t1"]);
    let result = client.search(&criteria(), Some("c1")).await.unwrap();

    assert_eq!(result.records.len(), 1);
    assert!(!result.has_next_page);
    assert_eq!(result.end_cursor, None);
}

#[tokio::test]
async fn test_tokens_rotate_per_request() {
    let server = MockServer::start().await;

    for token in ["first", "second"] {
        Mock::given(method("POST"))
            .and(header("authorization", format!("Bearer {}", token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&[], None, 4000, 1)))
            .expect(2)
            .mount(&server)
            .await;
    }

    let client = client_for(&server, &["first", "second"]);
    for _ in 0..4 {
        client.search(&criteria(), None).await.unwrap();
    }
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let client = client_for(&server, &["t1"]);
    let error = client.search(&criteria(), None).await.unwrap_err();

    match error {
        FetchError::Transient { message } => {
            assert!(message.contains("502"), "unexpected message: {}", message);
        }
        other => panic!("expected transient error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_graphql_errors_are_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "message": "Something went wrong while executing your query" }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, &["t1"]);
    let error = client.search(&criteria(), None).await.unwrap_err();

    assert!(matches!(error, FetchError::Transient { .. }));
    assert!(error.to_string().contains("Something went wrong"));
}

#[tokio::test]
async fn test_malformed_body_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, &["t1"]);
    let error = client.search(&criteria(), None).await.unwrap_err();

    assert!(matches!(error, FetchError::Transient { .. }));
}

#[tokio::test]
async fn test_near_exhaustion_is_rate_limit_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&["R_1"], Some("c1"), 5, 3)))
        .mount(&server)
        .await;

    let client = client_for(&server, &["t1"]);
    let error = client.search(&criteria(), None).await.unwrap_err();

    match error {
        FetchError::RateLimitNearExhaustion {
            reset_at,
            remaining,
            cost,
        } => {
            assert_eq!(remaining, 5);
            assert_eq!(cost, 3);
            assert_eq!(reset_at.to_rfc3339(), "2030-01-01T00:00:00+00:00");
        }
        other => panic!("expected rate-limit error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_remaining_above_twice_cost_is_served() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&["R_1"], None, 10, 3)))
        .mount(&server)
        .await;

    let client = client_for(&server, &["t1"]);
    let result = client.search(&criteria(), None).await.unwrap();

    assert_eq!(result.records.len(), 1);
}
