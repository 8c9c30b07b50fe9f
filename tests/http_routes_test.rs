//! Router-level contract: status codes and response shapes.
mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::*;
use scrape_gate::http::router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(reputation: Arc<StubReputation>) -> axum::Router {
    router(Arc::new(stub_state(
        test_config(),
        reputation,
        StubRenderer::serving("Home", &clean_text()),
        StubRenderer::serving("Home", &clean_text()),
    )))
}

fn post_scrape(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/scrape")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_valid_batch_returns_results() {
    let response = app(StubReputation::ok())
        .oneshot(post_scrape(
            json!({"urls": ["https://a.example.com", "foobar"]}).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert!(!body["request_id"].as_str().unwrap().is_empty());

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["status"], "success");
    assert_eq!(results[1]["status"], "failure");
    assert_eq!(results[1]["failure_reason"], "wrong_format");
    assert_eq!(results[1]["scraped_text"], "");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let reputation = StubReputation::ok();
    let response = app(reputation.clone())
        .oneshot(post_scrape("{\"urls\": [".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(read_json(response).await["error"].is_string());
    assert_eq!(reputation.calls(), 0);
}

#[tokio::test]
async fn test_wrong_shapes_are_bad_request() {
    for body in [
        json!(["https://a.example.com"]),
        json!({"links": []}),
        json!({"urls": "https://a.example.com"}),
        json!({"urls": [1, 2]}),
    ] {
        let response = app(StubReputation::ok())
            .oneshot(post_scrape(body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }
}

#[tokio::test]
async fn test_too_many_urls_runs_nothing() {
    let reputation = StubReputation::ok();
    let urls: Vec<String> = (0..51).map(|i| format!("https://h{i}.example.com")).collect();

    let response = app(reputation.clone())
        .oneshot(post_scrape(json!({ "urls": urls }).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("too many urls"));
    assert_eq!(reputation.calls(), 0);
}

#[tokio::test]
async fn test_duplicates_do_not_count_toward_cap() {
    let mut urls: Vec<String> = (0..50).map(|i| format!("https://h{i}.example.com")).collect();
    urls.extend(urls.clone());

    let response = app(StubReputation::ok())
        .oneshot(post_scrape(json!({ "urls": urls }).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["results"].as_array().unwrap().len(), 50);
}

#[tokio::test]
async fn test_health_reports_service() {
    let response = app(StubReputation::ok())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "scrape-gate");
    assert_eq!(body["browser_started"], false);
    assert_eq!(body["open_contexts"], 0);
}
