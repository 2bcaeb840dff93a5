//! HTTP service front
//!
//! - `GET /random`: `number_of_requests` random lookups streamed as NDJSON,
//!   one `{"key","value","provenance"}` object per line, in completion order
//! - `GET /resolve?key=K`: a single lookup for a key from the keyspace
//! - `GET /health`, `GET /metrics`

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{Error, METRICS};
use crate::coordinator::fanout::FanOut;
use crate::coordinator::resolve::Resolved;
use async_stream::stream;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Clone)]
pub struct AppState {
    pub fan_out: Arc<FanOut>,
    pub number_of_requests: usize,
    /// Store failures are reported here; the server shuts down on the first one.
    pub fatal: mpsc::UnboundedSender<Error>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/random", get(random_stream))
        .route("/resolve", get(resolve_key))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(request_tracing_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn random_stream(State(state): State<AppState>) -> impl IntoResponse {
    let n = state.number_of_requests;
    let (tx, mut rx) = mpsc::channel::<Resolved>(n.max(1));

    let fan_out = state.fan_out.clone();
    let fatal = state.fatal.clone();
    tokio::spawn(
        async move {
            match fan_out.handle(n, tx).await {
                Ok(()) => tracing::debug!(n, "Stream complete"),
                Err(Error::Transport(reason)) => {
                    tracing::info!(%reason, "Client went away mid-stream")
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "Aborting stream on store failure");
                    let _ = fatal.send(e);
                }
                Err(e) => tracing::error!(error = %e, "Stream failed"),
            }
        }
        .in_current_span(),
    );

    let lines = stream! {
        while let Some(resolved) = rx.recv().await {
            match serde_json::to_string(&resolved) {
                Ok(mut line) => {
                    line.push('\n');
                    yield Ok::<_, Infallible>(line);
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode result"),
            }
        }
    };

    (
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(lines),
    )
}

#[derive(Debug, Deserialize)]
struct ResolveQuery {
    key: String,
}

async fn resolve_key(State(state): State<AppState>, Query(query): Query<ResolveQuery>) -> Response {
    if !state.fan_out.contains(&query.key) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "key is not part of the keyspace", "key": query.key })),
        )
            .into_response();
    }

    match state.fan_out.coordinator().resolve(&query.key).await {
        Ok(resolved) => Json(resolved).into_response(),
        Err(e) => {
            let response =
                (e.to_http_status(), Json(json!({ "error": e.to_string() }))).into_response();
            if e.is_fatal() {
                let _ = state.fatal.send(e);
            }
            response
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "keys": state.fan_out.keys().len(),
        "number_of_requests": state.number_of_requests,
    }))
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.to_prometheus(),
    )
}
