//! RPC surface tests: drive the router as a service and check the wire
//! contract (JSON bodies, status codes, unknown-field tolerance).

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use lci::config::Settings;
use lci::filter::PathFilter;
use lci::index::IndexCoordinator;
use lci::parsing::ParserRegistry;
use lci::scheduler::IndexScheduler;
use lci::search::SearchEngine;
use lci::server::{AppState, router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn app_for(dir: &std::path::Path, files: &[(&str, &str)]) -> (Router, CancellationToken) {
    for (relative, content) in files {
        std::fs::write(dir.join(relative), content).unwrap();
    }

    let settings = Arc::new(Settings::for_root(dir.to_path_buf()));
    let filter = Arc::new(
        PathFilter::build(
            dir,
            &settings.indexing.include,
            &settings.indexing.exclude,
            &[],
        )
        .unwrap(),
    );
    let coordinator = Arc::new(IndexCoordinator::new(settings.limits.unhealthy_threshold));
    let scheduler = Arc::new(IndexScheduler::start(
        Arc::clone(&coordinator),
        Arc::clone(&settings),
        filter,
        Arc::new(ParserRegistry::new()),
    ));
    scheduler.walk_project();

    let progress = scheduler.progress();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !progress.ready() {
        assert!(Instant::now() < deadline, "indexing never settled");
        std::thread::sleep(Duration::from_millis(10));
    }

    let engine = Arc::new(SearchEngine::new(coordinator, Arc::clone(&settings)));
    let token = CancellationToken::new();
    let state = AppState::new(settings, engine, scheduler, token.clone());
    (router(state), token)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_status_and_ping() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _token) = app_for(dir.path(), &[("a.rs", "fn on_wire() {}\n")]);

    let (status, body) = get(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], json!(true));
    assert_eq!(body["file_count"], json!(1));

    let (status, body) = get(&app, "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["uptime_secs"].is_u64());
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_search_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _token) = app_for(dir.path(), &[("a.rs", "fn wire_target() {}\n")]);

    let (status, body) = post(
        &app,
        "/search",
        json!({"pattern": "wire_target", "max_results": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["name"], json!("wire_target"));
    assert_eq!(body["degraded"], json!(false));
}

#[tokio::test]
async fn test_unknown_request_fields_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _token) = app_for(dir.path(), &[("a.rs", "fn tolerant() {}\n")]);

    let (status, _body) = post(
        &app,
        "/search",
        json!({"pattern": "tolerant", "future_option": {"nested": true}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_request_is_400_with_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _token) = app_for(dir.path(), &[]);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/search")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_definition_references_and_tree_routes() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _token) = app_for(
        dir.path(),
        &[
            ("lib.rs", "fn wire_shared() {}\n"),
            ("main.rs", "fn main() {\n    wire_shared();\n}\n"),
        ],
    );

    let (status, body) = post(&app, "/definition", json!({"pattern": "wire_shared"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["path"], json!("lib.rs"));

    let (status, body) = post(&app, "/references", json!({"pattern": "wire_shared"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["path"], json!("main.rs"));

    let (status, body) = post(
        &app,
        "/tree",
        json!({"function_name": "main", "max_depth": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["roots"][0]["name"], json!("main"));
    assert_eq!(body["roots"][0]["calls"][0]["name"], json!("wire_shared"));
}

#[tokio::test]
async fn test_symbol_route_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _token) = app_for(dir.path(), &[("a.rs", "fn wire_sym() {}\n")]);

    let (_, found) = post(&app, "/search", json!({"pattern": "wire_sym"})).await;
    let id = found["results"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = post(&app, "/symbol", json!({"id": id})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"]["name"], json!("wire_sym"));

    let (status, body) = post(&app, "/symbol", json!({"id": "!!bad!!"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_stats_route() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _token) = app_for(dir.path(), &[("a.rs", "fn counted() {}\n")]);

    let _ = post(&app, "/search", json!({"pattern": "counted"})).await;
    let (status, body) = get(&app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file_count"], json!(1));
    assert_eq!(body["symbol_count"], json!(1));
    assert_eq!(body["counters"]["searches"], json!(1));
    assert!(body["memory"]["index_bytes"].is_u64() || body["memory"]["index_bytes"].is_number());
}

#[tokio::test]
async fn test_shutdown_route_cancels() {
    let dir = tempfile::tempdir().unwrap();
    let (app, token) = app_for(dir.path(), &[]);

    let (status, body) = post(&app, "/shutdown", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["shutting_down"], json!(true));

    tokio::time::timeout(Duration::from_secs(2), token.cancelled())
        .await
        .expect("shutdown token never cancelled");
}
