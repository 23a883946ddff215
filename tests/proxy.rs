//! End-to-end tests: router → cache directory → mock Twitter API

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use twitter_cache_proxy::cache::{CacheOrchestrator, FsCacheStore, ManualClock, Ttl};
use twitter_cache_proxy::server::build_router;
use twitter_cache_proxy::upstream::{Credentials, TwitterClient};

const TIMELINE_FILE: &str = "statuses-user-timeline-count-2-screen-name-jack.json";

fn proxy(server: &MockServer, cache_dir: &Path, clock: Arc<ManualClock>) -> Router {
    let client = TwitterClient::new(Credentials::Bearer("test-token".to_string()))
        .with_base_url(server.base_url());
    let store = FsCacheStore::with_dir(cache_dir.to_path_buf());
    let cache = CacheOrchestrator::new(Arc::new(store), Arc::new(client), Ttl::from_secs(60))
        .with_clock(clock);
    build_router(cache)
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Waits for the background cache write to land on disk
async fn wait_for_file(path: &Path, fetched_at: i64) -> Value {
    for _ in 0..200 {
        if let Ok(content) = std::fs::read(path) {
            let saved: Value = serde_json::from_slice(&content).unwrap();
            if saved["_cached"] == json!(fetched_at) {
                return saved;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("cache file {} was not written", path.display());
}

#[tokio::test]
async fn test_miss_then_hit_uses_cache_file() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/1.1/statuses/user_timeline.json")
                .query_param("screen_name", "jack")
                .query_param("count", "2");
            then.status(200).json_body(json!([{"id": 1, "text": "just setting up"}]));
        })
        .await;
    let cache_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let router = proxy(&server, cache_dir.path(), clock.clone());

    let (status, first) = get_json(&router, "/statuses/user_timeline?screen_name=jack&count=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, json!([{"id": 1, "text": "just setting up"}]));

    let saved = wait_for_file(&cache_dir.path().join(TIMELINE_FILE), 1_000).await;
    assert_eq!(saved["data"], first);

    clock.advance(30);
    let (status, second) = get_json(&router, "/statuses/user_timeline?count=2&screen_name=jack").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_stale_file_is_refreshed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/1.1/statuses/user_timeline.json");
            then.status(200).json_body(json!({"id": 2}));
        })
        .await;
    let cache_dir = TempDir::new().unwrap();
    let path = cache_dir.path().join(TIMELINE_FILE);
    std::fs::write(&path, r#"{"_cached": 0, "data": {"id": 1}}"#).unwrap();
    let clock = Arc::new(ManualClock::new(61));
    let router = proxy(&server, cache_dir.path(), clock.clone());

    let (status, body) = get_json(&router, "/statuses/user_timeline?screen_name=jack&count=2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": 2}));
    let saved = wait_for_file(&path, 61).await;
    assert_eq!(saved["data"], json!({"id": 2}));
}

#[tokio::test]
async fn test_upstream_failure_creates_no_file() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/1.1/statuses/user_timeline.json");
            then.status(503)
                .json_body(json!({"errors": [{"code": 130, "message": "Over capacity"}]}));
        })
        .await;
    let cache_dir = TempDir::new().unwrap();
    let router = proxy(&server, cache_dir.path(), Arc::new(ManualClock::new(0)));

    let (status, body) = get_json(&router, "/statuses/user_timeline?screen_name=jack&count=2").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["errors"][0]["code"], json!(130));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(std::fs::read_dir(cache_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unwritable_cache_still_returns_payload() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/1.1/users/suggestions/technology.json");
            then.status(200).json_body(json!({"name": "Technology", "users": []}));
        })
        .await;
    let temp_dir = TempDir::new().unwrap();
    let blocked = temp_dir.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").unwrap();
    let router = proxy(&server, &blocked, Arc::new(ManualClock::new(0)));

    let (status, body) = get_json(&router, "/users/suggestions/technology").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "Technology", "users": []}));
}
