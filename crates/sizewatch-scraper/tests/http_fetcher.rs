//! Integration tests for `HttpPageFetcher` and the orchestrator over HTTP.
//!
//! Uses `wiremock` to stand up a local marketplace for each test so no real
//! network traffic is made.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sizewatch_core::{CanonicalSize, QueryParam, SourceConfig};
use sizewatch_scraper::{
    FetchError, FetchOrchestrator, FetchSettings, HttpPageFetcher, PageFetcher,
    ResponseCollector, RetryPolicy,
};

fn test_fetcher() -> HttpPageFetcher {
    HttpPageFetcher::new(5, "sizewatch-test/0.1").expect("failed to build test fetcher")
}

fn test_settings() -> FetchSettings {
    FetchSettings {
        scroll_iterations: 3,
        scroll_pause: Duration::ZERO,
        settle_pause: Duration::ZERO,
        detail_pause: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts: 2,
            backoff_ms: 0,
        },
        min_page_text_len: 10,
        facet_poll_attempts: 1,
    }
}

/// A candidate-mode source whose search endpoint itself answers with JSON.
fn mock_source(base: &str) -> SourceConfig {
    let mut source = SourceConfig::mercari();
    source.base_url = base.to_owned();
    source.search_url = format!("{base}/v2/search_items");
    source.search_endpoint_patterns = vec!["search_items".to_owned()];
    source.affiliate = Some(QueryParam::new("afid", "42"));
    source
}

fn detail_html(size: &str) -> String {
    let data = json!({"props": {"pageProps": {"item": {"item": {"itemSize": {"name": size}}}}}});
    format!(
        r#"<html><head><script id="__NEXT_DATA__" type="application/json">{data}</script></head><body>detail</body></html>"#
    )
}

// ---------------------------------------------------------------------------
// HttpPageFetcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn navigate_loads_content_and_forwards_response_to_sink() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    let (collector, sink) = ResponseCollector::new();
    fetcher.subscribe(sink);

    let url = format!("{}/search", server.uri());
    fetcher.navigate(&url).await.unwrap();
    assert_eq!(fetcher.content().await.unwrap(), r#"{"items":[]}"#);

    fetcher.unsubscribe();
    let captured = collector.drain().await;
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].url, url);
    assert_eq!(captured[0].content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn scroll_requests_next_page_through_page_param() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"page": 2})))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"page": 1})))
        .mount(&server)
        .await;

    let fetcher = test_fetcher().with_scroll_param(Some("page".to_owned()));
    let (collector, sink) = ResponseCollector::new();
    fetcher.subscribe(sink);
    fetcher
        .navigate(&format!("{}/search?keyword=x", server.uri()))
        .await
        .unwrap();
    fetcher.scroll().await.unwrap();
    fetcher.unsubscribe();

    let bodies: Vec<String> = collector.drain().await.into_iter().map(|r| r.body).collect();
    assert_eq!(bodies, vec![r#"{"page":1}"#, r#"{"page":2}"#]);
    // The scrolled page is captured, not swapped in as the document.
    assert_eq!(fetcher.content().await.unwrap(), r#"{"page":1}"#);
}

#[tokio::test]
async fn scroll_without_page_param_is_a_no_op() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = test_fetcher();
    fetcher
        .navigate(&format!("{}/search", server.uri()))
        .await
        .unwrap();
    fetcher.scroll().await.unwrap();
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&server)
        .await;

    let err = test_fetcher().navigate(&server.uri()).await.unwrap_err();
    assert!(
        matches!(err, FetchError::RateLimited { retry_after_secs: 30, .. }),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn not_found_maps_to_unexpected_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = test_fetcher().navigate(&server.uri()).await.unwrap_err();
    assert!(matches!(err, FetchError::UnexpectedStatus { status: 404, .. }));
}

#[tokio::test]
async fn slow_response_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new(1, "sizewatch-test/0.1").unwrap();
    let err = fetcher.navigate(&server.uri()).await.unwrap_err();
    assert!(matches!(err, FetchError::Timeout { timeout_secs: 1, .. }), "got: {err:?}");
}

#[tokio::test]
async fn content_before_navigation_is_an_error() {
    let err = test_fetcher().content().await.unwrap_err();
    assert!(matches!(err, FetchError::Navigation { .. }));
}

// ---------------------------------------------------------------------------
// Orchestrator over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn orchestrator_resolves_cheapest_per_size_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/search_items"))
        .and(query_param("keyword", "Shoe X"))
        .and(query_param("status", "on_sale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "m1", "price": 5000, "itemConditionId": 1},
                {"id": "m2", "price": "4,500", "itemConditionId": 1},
                {"id": "m3", "price": 0, "itemConditionId": 1},
                {"id": "m4", "price": 3000, "itemConditionId": 2}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(detail_html("27cm"), "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/m2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(detail_html("28.5cm"), "text/html"))
        .mount(&server)
        .await;

    let source = mock_source(&server.uri());
    let settings = test_settings();
    let fetcher = test_fetcher();
    let orchestrator = FetchOrchestrator::new(&fetcher, &source, &settings).unwrap();

    let outcome = orchestrator.cheapest_per_size("Shoe X").await.unwrap();

    assert_eq!(outcome.candidates, 2);
    assert_eq!(outcome.sizes.len(), 2);
    let size_27 = &outcome.sizes[&CanonicalSize::new("27")];
    assert_eq!(size_27.price, 5000);
    assert_eq!(size_27.url, format!("{}/item/m1?afid=42", server.uri()));
    assert_eq!(outcome.sizes[&CanonicalSize::new("28.5")].price, 4500);
}

#[tokio::test]
async fn orchestrator_drops_candidate_whose_detail_page_keeps_failing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/search_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "m1", "price": 5000, "itemConditionId": 1}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/m1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let source = mock_source(&server.uri());
    let settings = test_settings();
    let fetcher = test_fetcher();
    let orchestrator = FetchOrchestrator::new(&fetcher, &source, &settings).unwrap();

    let outcome = orchestrator.cheapest_per_size("Shoe X").await.unwrap();

    assert!(outcome.sizes.is_empty());
    assert_eq!(outcome.fetch_errors, 1);
}
