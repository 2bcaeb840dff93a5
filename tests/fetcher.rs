//! HttpFetcher against a local origin

use axum::{routing::get, Router};
use stampede::fetcher::FETCH_FAILURE_PREFIX;
use stampede::{Fetcher, HttpFetcher};
use std::net::SocketAddr;
use std::time::Duration;

async fn spawn_origin() -> SocketAddr {
    let app = Router::new()
        .route("/ok", get(|| async { "hello from origin" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_successful_fetch_returns_url() {
    let addr = spawn_origin().await;
    let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
    let url = format!("http://{}/ok", addr);

    assert_eq!(fetcher.fetch(&url).await, url);
}

#[tokio::test]
async fn test_non_success_status_is_still_a_value() {
    let addr = spawn_origin().await;
    let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
    let url = format!("http://{}/missing", addr);

    assert_eq!(fetcher.fetch(&url).await, url);
}

#[tokio::test]
async fn test_timeout_becomes_placeholder() {
    let addr = spawn_origin().await;
    let fetcher = HttpFetcher::new(Duration::from_millis(200)).unwrap();
    let url = format!("http://{}/slow", addr);

    let value = fetcher.fetch(&url).await;
    assert!(value.starts_with(FETCH_FAILURE_PREFIX), "got {}", value);
}
