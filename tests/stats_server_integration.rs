//! Stats server integration tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use evently::stats_server::create_stats_router;
use evently::storage::{HitStorage, MemoryStorage, SqliteStorage};
use evently::time::TimestampFormat;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn sqlite_hits() -> Arc<dyn HitStorage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn memory_hits() -> Arc<dyn HitStorage> {
    Arc::new(MemoryStorage::new())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn post_hit(app: &Router, uri: &str, ip: &str, timestamp: &str) -> (StatusCode, Value) {
    let body = json!({
        "app": "ewm-main-service",
        "uri": uri,
        "ip": ip,
        "timestamp": timestamp
    });
    send(
        app,
        Request::builder()
            .method("POST")
            .uri("/hit")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

async fn get_stats(app: &Router, query: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .uri(format!("/stats?{query}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

const DAY: &str = "start=2024-05-01%2000:00:00&end=2024-05-01%2023:59:59";

async fn raw_and_unique(hits: Arc<dyn HitStorage>) {
    let app = create_stats_router(hits, TimestampFormat::default());

    let (status, stored) = post_hit(&app, "/events/1", "1.1.1.1", "2024-05-01 10:00:00").await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(stored["id"].is_i64());
    assert_eq!(stored["timestamp"], "2024-05-01 10:00:00");

    post_hit(&app, "/events/1", "1.1.1.1", "2024-05-01 10:00:01").await;

    let (status, raw) = get_stats(
        &app,
        "start=2024-05-01%2010:00:00&end=2024-05-01%2010:00:01",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        raw,
        json!([{"app": "ewm-main-service", "uri": "/events/1", "hits": 2}])
    );

    let (_, unique) = get_stats(
        &app,
        "start=2024-05-01%2010:00:00&end=2024-05-01%2010:00:01&unique=true",
    )
    .await;
    assert_eq!(unique[0]["hits"], 1);
}

#[tokio::test]
async fn test_raw_and_unique_counts_sqlite() {
    raw_and_unique(sqlite_hits().await).await;
}

#[tokio::test]
async fn test_raw_and_unique_counts_memory() {
    raw_and_unique(memory_hits()).await;
}

#[tokio::test]
async fn test_uris_filter_and_ordering() {
    let app = create_stats_router(sqlite_hits().await, TimestampFormat::default());

    for (uri, ip) in [
        ("/events/1", "1.1.1.1"),
        ("/events/2", "1.1.1.1"),
        ("/events/2", "2.2.2.2"),
        ("/events/3", "1.1.1.1"),
        ("/events", "1.1.1.1"),
    ] {
        post_hit(&app, uri, ip, "2024-05-01 12:00:00").await;
    }

    let (_, all) = get_stats(&app, DAY).await;
    let uris: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["uri"].as_str().unwrap())
        .collect();
    assert_eq!(uris, vec!["/events/2", "/events/1", "/events/3", "/events"]);

    let (_, repeated) = get_stats(&app, &format!("{DAY}&uris=/events/1&uris=/events/3")).await;
    assert_eq!(repeated.as_array().unwrap().len(), 2);

    let (_, comma) = get_stats(&app, &format!("{DAY}&uris=/events/1,/events/3")).await;
    assert_eq!(comma, repeated);
}

#[tokio::test]
async fn test_invalid_requests() {
    let app = create_stats_router(memory_hits(), TimestampFormat::default());

    let (status, body) = get_stats(
        &app,
        "start=2024-05-02%2000:00:00&end=2024-05-01%2000:00:00",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("after"));

    let (status, _) = get_stats(&app, "start=2024-05-01%2000:00:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_hit(&app, "/events/1", "1.1.1.1", "01/05/2024 10:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_hit(&app, "", "1.1.1.1", "2024-05-01 10:00:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_range_returns_empty_list() {
    let app = create_stats_router(memory_hits(), TimestampFormat::default());
    let (status, body) = get_stats(&app, DAY).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}
