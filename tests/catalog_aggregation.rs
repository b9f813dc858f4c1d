//! Integration tests for catalog aggregation and search over HTTP.
//!
//! Each test starts its own mock catalog API. Retry delays are shortened so
//! exhausted retries finish quickly.

use marquee::catalog::{
    CatalogAggregator, CatalogClient, CategoryOutcome, CategorySpec, MovieSource,
    SearchController, SearchOutcome,
};
use marquee::util::RetryPolicy;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> Arc<dyn MovieSource> {
    Arc::new(CatalogClient::new(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        SecretString::from("test-key"),
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            request_timeout: Duration::from_secs(5),
        },
    ))
}

fn hits(prefix: &str, n: usize) -> serde_json::Value {
    let items: Vec<_> = (0..n)
        .map(|i| {
            json!({
                "imdbID": format!("{prefix}{i}"),
                "Title": format!("{prefix} movie {i}"),
                "Year": "2010",
                "Poster": "N/A",
                "Type": "movie"
            })
        })
        .collect();
    json!({ "Search": items, "totalResults": n.to_string(), "Response": "True" })
}

async fn mock_term(server: &MockServer, term: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(query_param("s", term))
        .and(query_param("apikey", "test-key"))
        .respond_with(response)
        .mount(server)
        .await;
}

// ============================================================================
// Aggregation
// ============================================================================

#[tokio::test]
async fn test_failing_category_is_isolated() {
    let server = MockServer::start().await;
    mock_term(&server, "alpha", ResponseTemplate::new(200).set_body_json(hits("a", 3))).await;
    mock_term(&server, "beta", ResponseTemplate::new(500)).await;
    mock_term(
        &server,
        "gamma",
        ResponseTemplate::new(200)
            .set_body_json(hits("c", 2))
            .set_delay(Duration::from_millis(300)),
    )
    .await;

    let aggregator = Arc::new(
        CatalogAggregator::new(
            client(&server),
            vec![
                CategorySpec::new("A", "alpha"),
                CategorySpec::new("B", "beta"),
                CategorySpec::new("C", "gamma"),
            ],
            3,
        )
        .unwrap(),
    );
    let mut rx = aggregator.subscribe();
    let handle = aggregator.spawn();

    // A and B settle while C is still in flight; the barrier holds.
    let partial = rx
        .wait_for(|s| s.get("A").unwrap().settled && s.get("B").unwrap().settled)
        .await
        .unwrap()
        .clone();
    assert!(partial.loading);
    assert!(!partial.get("C").unwrap().settled);

    handle.join().await;
    let state = aggregator.state();

    assert!(!state.loading);
    assert_eq!(state.get("A").unwrap().items.len(), 3);
    assert_eq!(state.get("C").unwrap().items.len(), 2);
    let b = state.get("B").unwrap();
    assert!(b.items.is_empty());
    assert!(b.settled);
    assert!(matches!(b.outcome, CategoryOutcome::Failed(_)));

    // configured order is kept regardless of completion order
    let labels: Vec<_> = state.results().iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_no_match_is_empty_not_failed() {
    let server = MockServer::start().await;
    mock_term(
        &server,
        "zzzz",
        ResponseTemplate::new(200)
            .set_body_json(json!({ "Response": "False", "Error": "Movie not found!" })),
    )
    .await;
    mock_term(
        &server,
        "bad",
        ResponseTemplate::new(200)
            .set_body_json(json!({ "Response": "False", "Error": "Invalid API key!" })),
    )
    .await;

    let aggregator = CatalogAggregator::new(
        client(&server),
        vec![
            CategorySpec::new("Nothing", "zzzz"),
            CategorySpec::new("Broken", "bad"),
        ],
        2,
    )
    .unwrap();
    let state = aggregator.run().await;

    assert_eq!(state.get("Nothing").unwrap().outcome, CategoryOutcome::Empty);
    assert!(state.get("Broken").unwrap().is_failed());
    // both render as an empty row
    assert!(state.get("Nothing").unwrap().items.is_empty());
    assert!(state.get("Broken").unwrap().items.is_empty());
}

#[tokio::test]
async fn test_transient_failure_retried_within_category() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("s", "flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mock_term(&server, "flaky", ResponseTemplate::new(200).set_body_json(hits("f", 1))).await;

    let aggregator =
        CatalogAggregator::new(client(&server), vec![CategorySpec::new("Flaky", "flaky")], 1)
            .unwrap();
    let state = aggregator.run().await;

    assert_eq!(state.get("Flaky").unwrap().outcome, CategoryOutcome::Loaded);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_blank_search_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hits("x", 1)))
        .expect(0)
        .mount(&server)
        .await;

    let search = SearchController::new(client(&server));
    assert_eq!(search.submit("").await, Some(SearchOutcome::Empty));
    assert_eq!(search.submit(" \t ").await, Some(SearchOutcome::Empty));
    assert!(search.state().results.is_empty());
    assert!(!search.is_loading());
}

#[tokio::test]
async fn test_last_submitted_query_wins() {
    let server = MockServer::start().await;
    mock_term(
        &server,
        "slow",
        ResponseTemplate::new(200)
            .set_body_json(hits("slow", 5))
            .set_delay(Duration::from_millis(300)),
    )
    .await;
    mock_term(&server, "fast", ResponseTemplate::new(200).set_body_json(hits("fast", 2))).await;

    let search = SearchController::new(client(&server));
    let first = search.submit("slow");
    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        search.submit("fast").await
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first, None);
    assert_eq!(second, Some(SearchOutcome::Loaded));

    let state = search.state();
    assert_eq!(state.query, "fast");
    assert_eq!(state.results.len(), 2);
    assert!(state.results.iter().all(|m| m.id.starts_with("fast")));
    assert!(!state.loading);
}
