use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use powerbi_metadata_extractor::ExtractError;
use powerbi_metadata_extractor::LogLevel;
use powerbi_metadata_extractor::powerbi::fetcher::{Backoff, PaginatedFetcher, RetryPolicy};

#[derive(Default)]
struct RecordingBackoff {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingBackoff {
    fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backoff for RecordingBackoff {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}

fn fetcher(policy: RetryPolicy, backoff: Arc<RecordingBackoff>) -> PaginatedFetcher {
    PaginatedFetcher::new("test-token", true, LogLevel::Debug)
        .unwrap()
        .with_retry_policy(policy)
        .with_backoff(backoff)
}

#[tokio::test]
async fn follows_next_links_in_server_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("Authorization", "Bearer test-token"))
        .and(query_param("$top", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": 1}, {"id": 2}],
            "@odata.nextLink": format!("{}/items?page=2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", "2"))
        .and(query_param_is_missing("$top"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [],
            "@odata.nextLink": format!("{}/items?page=3", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": 3}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backoff = Arc::new(RecordingBackoff::default());
    let items = fetcher(RetryPolicy::default(), backoff.clone())
        .fetch_all(&format!("{}/items", server.uri()), Some(&[("$top", "2")][..]))
        .await
        .unwrap();

    let ids: Vec<i64> = items.iter().filter_map(|item| item["id"].as_i64()).collect();
    assert_eq!(ids, vec![1_i64, 2, 3]);
    assert!(backoff.delays().is_empty());
}

#[tokio::test]
async fn retries_throttling_with_exponential_backoff() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/capacities"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/capacities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "c1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backoff = Arc::new(RecordingBackoff::default());
    let items = fetcher(RetryPolicy::new(5, 2.0), backoff.clone())
        .fetch_all(&format!("{}/capacities", server.uri()), None)
        .await
        .unwrap();

    assert_eq!(items, vec![json!({"id": "c1"})]);
    assert_eq!(
        backoff.delays(),
        [Duration::from_secs_f64(2.0), Duration::from_secs_f64(4.0)]
    );
}

#[tokio::test]
async fn exhausted_retries_fail_the_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": 1}],
            "@odata.nextLink": format!("{}/items?page=2", server.uri())
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let backoff = Arc::new(RecordingBackoff::default());
    let err = fetcher(RetryPolicy::new(3, 0.5), backoff.clone())
        .fetch_all(&format!("{}/items", server.uri()), None)
        .await
        .unwrap_err();

    match &err {
        ExtractError::RetriesExhausted {
            attempts, status, ..
        } => {
            assert_eq!(*attempts, 3);
            assert_eq!(*status, 503);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert!(err.is_transient());
    assert_eq!(backoff.delays().len(), 2);
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gateways"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let backoff = Arc::new(RecordingBackoff::default());
    let err = fetcher(RetryPolicy::default(), backoff.clone())
        .fetch_all(&format!("{}/gateways", server.uri()), None)
        .await
        .unwrap_err();

    assert!(!err.is_transient());
    match err {
        ExtractError::Api { status, body, .. } => {
            assert_eq!(status, 403);
            assert_eq!(body, "forbidden");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(backoff.delays().is_empty());
}

#[tokio::test]
async fn single_object_value_stops_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/single"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": {"id": "only"},
            "@odata.nextLink": format!("{}/single?page=2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/single"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(0)
        .mount(&server)
        .await;

    let items = fetcher(RetryPolicy::default(), Arc::new(RecordingBackoff::default()))
        .fetch_all(&format!("{}/single", server.uri()), None)
        .await
        .unwrap();

    assert_eq!(items, vec![json!({"id": "only"})]);
}

#[tokio::test]
async fn malformed_json_fails_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .expect(1)
        .mount(&server)
        .await;

    let backoff = Arc::new(RecordingBackoff::default());
    let err = fetcher(RetryPolicy::default(), backoff.clone())
        .fetch_all(&format!("{}/broken", server.uri()), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::Decode { .. }));
    assert!(!err.is_transient());
    assert!(backoff.delays().is_empty());
}

#[tokio::test]
async fn non_object_body_fails_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
        .expect(1)
        .mount(&server)
        .await;

    let backoff = Arc::new(RecordingBackoff::default());
    let err = fetcher(RetryPolicy::default(), backoff.clone())
        .fetch_all(&format!("{}/listing", server.uri()), None)
        .await
        .unwrap_err();

    match err {
        ExtractError::Decode { reason, .. } => assert_eq!(reason, "expected a JSON object"),
        other => panic!("expected Decode error, got {other:?}"),
    }
    assert!(backoff.delays().is_empty());
}

#[tokio::test]
async fn transport_failures_fail_without_retry() {
    let backoff = Arc::new(RecordingBackoff::default());
    let err = fetcher(RetryPolicy::default(), backoff.clone())
        .fetch_all("http://127.0.0.1:1/unreachable", None)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::Request(_)));
    assert!(!err.is_transient());
    assert!(backoff.delays().is_empty());
}

#[tokio::test]
async fn missing_value_contributes_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"@odata.count": 0})))
        .mount(&server)
        .await;

    let items = fetcher(RetryPolicy::default(), Arc::new(RecordingBackoff::default()))
        .fetch_all(&format!("{}/empty", server.uri()), None)
        .await
        .unwrap();

    assert!(items.is_empty());
}
