//! HTTP front: streaming endpoint, single lookups, health and metrics

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{config, memory_store, DownStore, RecordingFetcher};
use stampede::common::tracing_middleware::REQUEST_ID_HEADER;
use stampede::common::Error;
use stampede::coordinator::http::{create_router, AppState, NDJSON_CONTENT_TYPE};
use stampede::{FanOut, Provenance, Resolved, SharedStore, StampedeCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

fn app(
    store: Arc<dyn SharedStore>,
    keys: &[&str],
    n: usize,
) -> (Router, Arc<RecordingFetcher>, mpsc::UnboundedReceiver<Error>) {
    let fetcher = Arc::new(RecordingFetcher::new(Duration::from_millis(20)));
    let config = config(keys, 60, 60);
    let coordinator = Arc::new(StampedeCoordinator::new(&config, store, fetcher.clone()));
    let fan_out = Arc::new(FanOut::new(coordinator, config.urls.clone()));
    let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
    let router = create_router(AppState {
        fan_out,
        number_of_requests: n,
        fatal: fatal_tx,
    });
    (router, fetcher, fatal_rx)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_streams_ndjson() {
    let (router, fetcher, _fatal) = app(memory_store(), &["a"], 25);

    let response = router
        .oneshot(Request::get("/random").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        NDJSON_CONTENT_TYPE
    );
    assert!(response.headers().get(REQUEST_ID_HEADER).is_some());

    let text = body_text(response).await;
    let results: Vec<Resolved> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(results.len(), 25);
    assert_eq!(
        results
            .iter()
            .filter(|r| r.provenance == Provenance::OriginFetch)
            .count(),
        1
    );
    assert_eq!(fetcher.calls_for("a"), 1);
    assert!(text.contains("\"provenance\":\"cache-hit\""));
}

#[tokio::test]
async fn test_resolve_known_key() {
    let (router, _fetcher, _fatal) = app(memory_store(), &["a", "b"], 1);

    let response = router
        .clone()
        .oneshot(Request::get("/resolve?key=b").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let resolved: Resolved = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(resolved.key, "b");
    assert_eq!(resolved.value, "fetched:b");
    assert_eq!(resolved.provenance, Provenance::OriginFetch);

    let response = router
        .oneshot(Request::get("/resolve?key=b").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let resolved: Resolved = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(resolved.provenance, Provenance::CacheHit);
}

#[tokio::test]
async fn test_resolve_rejects_unknown_key() {
    let (router, fetcher, _fatal) = app(memory_store(), &["a"], 1);

    let response = router
        .oneshot(
            Request::get("/resolve?key=http%3A%2F%2Fevil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_store_failure_is_reported_as_fatal() {
    let (router, _fetcher, mut fatal) = app(Arc::new(DownStore), &["a"], 1);

    let response = router
        .oneshot(Request::get("/resolve?key=a").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let err = fatal.try_recv().expect("fatal error reported");
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_stream_store_failure_is_reported_as_fatal() {
    let (router, _fetcher, mut fatal) = app(Arc::new(DownStore), &["a"], 3);

    let response = router
        .oneshot(Request::get("/random").body(Body::empty()).unwrap())
        .await
        .unwrap();
    // Headers are already out; the body just ends early
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.is_empty());

    let err = tokio::time::timeout(Duration::from_secs(2), fatal.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (router, _fetcher, _fatal) = app(memory_store(), &["a", "b", "c"], 4);

    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["keys"], 3);
    assert_eq!(health["number_of_requests"], 4);

    let response = router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("stampede_cache_hits_total"));
    assert!(text.contains("stampede_origin_fetches_total"));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (router, _fetcher, _fatal) = app(memory_store(), &["a"], 1);

    let response = router
        .oneshot(
            Request::get("/health")
                .header(REQUEST_ID_HEADER, "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-123");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resolve_decodes_with_http_client() {
    let (router, _fetcher, _fatal) = app(memory_store(), &["a"], 1);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await });

    let resolved: Resolved = reqwest::Client::new()
        .get(format!("http://{}/resolve", addr))
        .query(&[("key", "a")])
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resolved.key, "a");
    assert_eq!(resolved.value, "fetched:a");
    assert_eq!(resolved.provenance, Provenance::OriginFetch);
}
