use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::json;
use sizewatch_core::{CanonicalSize, FacetSize, SourceConfig};

use super::*;
use crate::fetcher::{CapturedResponse, ResponseSink};

#[derive(Clone)]
enum Step {
    Page {
        body: String,
        emitted: Vec<CapturedResponse>,
    },
    Fail,
}

/// Fetcher driven by a per-URL script. The last step for a URL repeats.
#[derive(Default)]
struct ScriptedFetcher {
    script: Mutex<HashMap<String, VecDeque<Step>>>,
    body: Mutex<Option<String>>,
    sink: Mutex<Option<ResponseSink>>,
    visits: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn step(self, url: &str, step: Step) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(url.to_owned())
            .or_default()
            .push_back(step);
        self
    }

    fn page(self, url: &str, body: &str) -> Self {
        self.step(
            url,
            Step::Page {
                body: body.to_owned(),
                emitted: Vec::new(),
            },
        )
    }

    fn page_with_api(self, url: &str, body: &str, emitted: Vec<CapturedResponse>) -> Self {
        self.step(
            url,
            Step::Page {
                body: body.to_owned(),
                emitted,
            },
        )
    }

    fn fail(self, url: &str) -> Self {
        self.step(url, Step::Fail)
    }

    fn visits(&self, url: &str) -> usize {
        self.visits.lock().unwrap().iter().filter(|v| *v == url).count()
    }

    fn visited_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.visits
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl PageFetcher for ScriptedFetcher {
    async fn navigate(&self, url: &str) -> Result<(), FetchError> {
        self.visits.lock().unwrap().push(url.to_owned());
        let step = {
            let mut script = self.script.lock().unwrap();
            let queue = script.get_mut(url).ok_or_else(|| FetchError::UnexpectedStatus {
                status: 404,
                url: url.to_owned(),
            })?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };
        match step {
            Some(Step::Page { body, emitted }) => {
                if let Some(sink) = self.sink.lock().unwrap().as_ref() {
                    for response in emitted {
                        sink.send(response).unwrap();
                    }
                }
                *self.body.lock().unwrap() = Some(body);
                Ok(())
            }
            Some(Step::Fail) | None => Err(FetchError::Timeout {
                url: url.to_owned(),
                timeout_secs: 1,
            }),
        }
    }

    async fn scroll(&self) -> Result<(), FetchError> {
        Ok(())
    }

    async fn content(&self) -> Result<String, FetchError> {
        self.body
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FetchError::Navigation {
                url: String::new(),
                reason: "nothing loaded".to_owned(),
            })
    }

    fn subscribe(&self, sink: ResponseSink) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    fn unsubscribe(&self) {
        self.sink.lock().unwrap().take();
    }
}

fn settings() -> FetchSettings {
    FetchSettings {
        scroll_iterations: 2,
        scroll_pause: Duration::ZERO,
        settle_pause: Duration::ZERO,
        detail_pause: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts: 2,
            backoff_ms: 0,
        },
        min_page_text_len: 10,
        facet_poll_attempts: 3,
    }
}

fn mercari() -> SourceConfig {
    let mut source = SourceConfig::mercari();
    source.detail.status_path = Some(
        ["props", "pageProps", "item", "item", "status"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
    );
    source
}

const SEARCH_URL: &str = "https://jp.mercari.com/search?keyword=Shoe%20X&status=on_sale";

fn api_response(items: &serde_json::Value) -> CapturedResponse {
    CapturedResponse {
        url: "https://api.mercari.jp/v2/entities:search".to_owned(),
        content_type: Some("application/json".to_owned()),
        body: json!({ "items": items }).to_string(),
    }
}

fn detail_page(item: &serde_json::Value) -> String {
    let data = json!({"props": {"pageProps": {"item": {"item": item}}}});
    format!(
        r#"<html><script id="__NEXT_DATA__" type="application/json">{data}</script><body>item</body></html>"#
    )
}

fn detail_url(id: &str) -> String {
    format!("https://jp.mercari.com/item/{id}")
}

#[tokio::test]
async fn detail_pages_are_visited_cheapest_first_with_ties_in_discovery_order() {
    let items = json!([
        {"id": "m5", "price": 5000, "itemConditionId": 1},
        {"id": "z9", "price": 3000, "itemConditionId": 1},
        {"id": "k1", "price": 3000, "itemConditionId": 1},
        {"id": "d4", "price": 4000, "itemConditionId": 1},
        {"id": "m5", "price": 2000, "itemConditionId": 1}
    ]);
    let sized = detail_page(&json!({"itemSize": {"name": "27cm"}}));
    let fetcher = ScriptedFetcher::default()
        .page_with_api(SEARCH_URL, "<html>search</html>", vec![api_response(&items)])
        .page(&detail_url("m5"), &sized)
        .page(&detail_url("z9"), &sized)
        .page(&detail_url("k1"), &sized)
        .page(&detail_url("d4"), &sized);
    let source = mercari();
    let settings = settings();
    let orchestrator = FetchOrchestrator::new(&fetcher, &source, &settings).unwrap();

    let outcome = orchestrator.cheapest_per_size("Shoe X").await.unwrap();

    assert_eq!(outcome.candidates, 4);
    assert_eq!(
        fetcher.visited_with_prefix("https://jp.mercari.com/item/"),
        vec![
            detail_url("m5"),
            detail_url("z9"),
            detail_url("k1"),
            detail_url("d4")
        ]
    );
    assert_eq!(outcome.sizes[&CanonicalSize::new("27")].price, 2000);
}

#[tokio::test]
async fn candidate_mode_keeps_cheapest_per_size_and_counts_drops() {
    let items = json!([
        {"id": "m1", "price": 5000, "itemConditionId": 1},
        {"id": "m2", "price": 4000, "itemConditionId": 1},
        {"id": "m3", "price": 6000, "itemConditionId": 1},
        {"id": "m4", "price": 3000, "itemConditionId": 1},
        {"id": "m5", "price": 1000, "itemConditionId": 3},
        {"id": "m6", "price": 2000, "itemConditionId": 1},
        {"id": "m7", "price": 2500, "itemConditionId": 1}
    ]);
    let fetcher = ScriptedFetcher::default()
        .page_with_api(SEARCH_URL, "<html>search</html>", vec![api_response(&items)])
        .page(&detail_url("m1"), &detail_page(&json!({"itemSize": {"name": "27cm"}})))
        .page(&detail_url("m2"), &detail_page(&json!({"itemSize": {"name": "27cm"}})))
        .page(&detail_url("m3"), &detail_page(&json!({"itemSize": {"name": "28cm"}})))
        .page(&detail_url("m4"), &detail_page(&json!({})))
        .fail(&detail_url("m6"))
        .page(
            &detail_url("m7"),
            &detail_page(&json!({"status": "sold_out", "itemSize": {"name": "26cm"}})),
        );
    let source = mercari();
    let settings = settings();
    let orchestrator = FetchOrchestrator::new(&fetcher, &source, &settings).unwrap();

    let outcome = orchestrator.cheapest_per_size("Shoe X").await.unwrap();

    assert_eq!(outcome.candidates, 6);
    assert_eq!(outcome.resolved, 3);
    assert_eq!(outcome.no_size, 1);
    assert_eq!(outcome.filtered, 1);
    assert_eq!(outcome.fetch_errors, 1);
    assert_eq!(outcome.sizes.len(), 2);

    let size_27 = &outcome.sizes[&CanonicalSize::new("27")];
    assert_eq!(size_27.price, 4000);
    assert_eq!(size_27.url, "https://jp.mercari.com/item/m2?afid=4997609843");
    assert_eq!(outcome.sizes[&CanonicalSize::new("28")].price, 6000);

    assert_eq!(fetcher.visits(&detail_url("m6")), 2, "transient failure retried once");
    assert_eq!(fetcher.visits(&detail_url("m5")), 0, "used item never visited");
}

#[tokio::test]
async fn transient_detail_failure_recovers_on_retry() {
    let items = json!([{"id": "m1", "price": 5000, "itemConditionId": 1}]);
    let fetcher = ScriptedFetcher::default()
        .page_with_api(SEARCH_URL, "<html>search</html>", vec![api_response(&items)])
        .fail(&detail_url("m1"))
        .page(&detail_url("m1"), &detail_page(&json!({"itemSize": {"name": "27.5cm"}})));
    let source = mercari();
    let settings = settings();
    let orchestrator = FetchOrchestrator::new(&fetcher, &source, &settings).unwrap();

    let outcome = orchestrator.cheapest_per_size("Shoe X").await.unwrap();

    assert_eq!(outcome.fetch_errors, 0);
    assert_eq!(outcome.sizes[&CanonicalSize::new("27.5")].price, 5000);
    assert_eq!(fetcher.visits(&detail_url("m1")), 2);
}

#[tokio::test]
async fn embedded_search_results_are_used_and_non_search_responses_ignored() {
    let embedded = json!({"items": [{"id": "m9", "price": 7000, "itemConditionId": "1"}]});
    let search_page = format!(
        r#"<html><script id="__NEXT_DATA__" type="application/json">{embedded}</script></html>"#
    );
    let unrelated = CapturedResponse {
        url: "https://api.mercari.jp/v2/items/get".to_owned(),
        content_type: Some("application/json".to_owned()),
        body: json!({"items": [{"id": "x", "price": 1, "itemConditionId": 1}]}).to_string(),
    };
    let fetcher = ScriptedFetcher::default()
        .page_with_api(SEARCH_URL, &search_page, vec![unrelated])
        .page(&detail_url("m9"), &detail_page(&json!({"itemSize": {"name": "29cm"}})));
    let source = mercari();
    let settings = settings();
    let orchestrator = FetchOrchestrator::new(&fetcher, &source, &settings).unwrap();

    let outcome = orchestrator.cheapest_per_size("Shoe X").await.unwrap();

    assert_eq!(outcome.candidates, 1);
    assert_eq!(outcome.sizes[&CanonicalSize::new("29")].price, 7000);
    assert_eq!(fetcher.visits(&detail_url("x")), 0);
}

#[tokio::test]
async fn search_navigation_failure_is_returned_after_retries() {
    let fetcher = ScriptedFetcher::default().fail(SEARCH_URL);
    let source = mercari();
    let settings = settings();
    let orchestrator = FetchOrchestrator::new(&fetcher, &source, &settings).unwrap();

    let err = orchestrator.cheapest_per_size("Shoe X").await.unwrap_err();

    assert!(matches!(err, FetchError::Timeout { .. }));
    assert_eq!(fetcher.visits(SEARCH_URL), 2);
}

fn facet_source() -> SourceConfig {
    let mut source = SourceConfig::paypay();
    if let Some(facet) = source.size_facet.as_mut() {
        facet.sizes = vec![
            FacetSize { label: "27cm".into(), value_id: 236_673 },
            FacetSize { label: "28cm".into(), value_id: 236_675 },
            FacetSize { label: "29cm".into(), value_id: 236_677 },
        ];
    }
    source
}

fn facet_url(source: &SourceConfig, label: &str) -> String {
    let facet = source.size_facet.as_ref().unwrap();
    let size = facet.sizes.iter().find(|s| s.label == label).unwrap();
    source.search_url("Dunk Low", &[facet.filter_for(size)])
}

fn facet_page(items: &serde_json::Value) -> String {
    let data = json!({"props": {"pageProps": {"searchResult": {"items": items}}}});
    format!(r#"<html><script id="__NEXT_DATA__" type="application/json">{data}</script></html>"#)
}

#[tokio::test]
async fn facet_mode_takes_cheapest_item_per_facet_size() {
    let source = facet_source();
    let fetcher = ScriptedFetcher::default()
        .page(
            &facet_url(&source, "27cm"),
            &facet_page(&json!([{"id": "z1", "price": 9000}, {"id": "z0", "price": 8000}])),
        )
        .page(&facet_url(&source, "28cm"), &facet_page(&json!([])))
        .fail(&facet_url(&source, "29cm"));
    let settings = settings();
    let orchestrator = FetchOrchestrator::new(&fetcher, &source, &settings).unwrap();

    let outcome = orchestrator.cheapest_per_size("Dunk Low").await.unwrap();

    assert_eq!(outcome.sizes.len(), 1);
    let entry = &outcome.sizes[&CanonicalSize::new("27")];
    assert_eq!(entry.price, 8000);
    assert_eq!(entry.url, "https://paypayfleamarket.yahoo.co.jp/item/z0");
    assert_eq!(outcome.fetch_errors, 1);
    assert_eq!(fetcher.visits(&facet_url(&source, "28cm")), 1, "polling re-reads, never re-navigates");
}

#[tokio::test]
async fn facet_mode_reports_error_when_every_size_fails() {
    let source = facet_source();
    let fetcher = ScriptedFetcher::default();
    let settings = settings();
    let orchestrator = FetchOrchestrator::new(&fetcher, &source, &settings).unwrap();

    let err = orchestrator.cheapest_per_size("Dunk Low").await.unwrap_err();
    assert!(matches!(err, FetchError::UnexpectedStatus { status: 404, .. }));
}

#[tokio::test]
async fn facet_mode_without_table_is_a_configuration_error() {
    let mut source = SourceConfig::paypay();
    source.size_facet = None;
    let fetcher = ScriptedFetcher::default();
    let settings = settings();
    let orchestrator = FetchOrchestrator::new(&fetcher, &source, &settings).unwrap();

    let err = orchestrator.cheapest_per_size("Dunk Low").await.unwrap_err();
    assert!(matches!(err, FetchError::MissingFacetTable { .. }));
}

#[test]
fn settings_follow_app_config_timings() {
    let config = sizewatch_core::AppConfig {
        database_url: String::new(),
        log_level: "info".into(),
        catalog_path: "catalog.yaml".into(),
        sources_path: None,
        db_max_connections: 1,
        db_min_connections: 1,
        db_acquire_timeout_secs: 1,
        fetch_timeout_secs: 5,
        user_agent: "test".into(),
        scroll_iterations: 4,
        scroll_pause_ms: 100,
        settle_pause_ms: 200,
        detail_pause_ms: 300,
        max_attempts: 3,
        retry_backoff_ms: 50,
        keyword_cooldown_ms: 0,
        min_page_text_len: 150,
        facet_poll_attempts: 6,
        invalidation: sizewatch_core::InvalidationPolicy::ZeroMissing,
    };
    let settings = FetchSettings::from_app_config(&config);
    assert_eq!(settings.scroll_iterations, 4);
    assert_eq!(settings.settle_pause, Duration::from_millis(200));
    assert_eq!(settings.retry, RetryPolicy { max_attempts: 3, backoff_ms: 50 });
    assert_eq!(settings.min_page_text_len, 150);
}
