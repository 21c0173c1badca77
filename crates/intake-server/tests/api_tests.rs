//! HTTP surface tests
//!
//! Drive the router with `oneshot` against in-memory collaborators.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{orders_file, Harness};
use intake_common::FileFingerprint;
use intake_server::api::{self, AppState};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    let state = AppState {
        orchestrator: h.orchestrator.clone(),
    };
    api::router(state, Duration::from_secs(30))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_post_envelope_returns_outcome() {
    let h = Harness::new();
    let content = orders_file(3);
    h.land("landing/orders/a.csv", &content);

    let (status, body) = send(
        app(&h),
        post_json(
            "/deliveries",
            json!({ "sourceLocation": "landing/orders/a.csv", "declaredSizeBytes": content.len() }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disposition"], "COMPLETED");
    assert_eq!(body["status"], "HANDOFF_SUCCEEDED");
    assert_eq!(body["targetTable"], "orders");
    assert_eq!(body["rowCountRepaired"], 3);
    assert_eq!(body["fingerprint"], FileFingerprint::of(content.as_bytes()).to_string());
}

#[tokio::test]
async fn test_post_push_wrapper_with_object_notification() {
    let h = Harness::new();
    let content = orders_file(2);
    h.land("s3://landing-bucket/landing/orders/b.csv", &content);

    let notification = json!({
        "bucket": "landing-bucket",
        "name": "landing/orders/b.csv",
        "size": content.len().to_string(),
    });
    let push = json!({
        "message": {
            "data": STANDARD.encode(notification.to_string()),
            "messageId": "42",
        },
        "subscription": "projects/p/subscriptions/intake",
    });

    let (status, body) = send(app(&h), post_json("/deliveries", push)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disposition"], "COMPLETED");
    assert_eq!(h.publisher.handoffs()[0].original_location, "s3://landing-bucket/landing/orders/b.csv");
}

#[tokio::test]
async fn test_failed_attempt_still_returns_200() {
    let h = Harness::new();
    h.land("landing/orders/blank.csv", "");

    let (status, body) = send(
        app(&h),
        post_json("/deliveries", json!({ "sourceLocation": "landing/orders/blank.csv" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disposition"], "FAILED");
    assert_eq!(body["status"], "DEAD_LETTERED");
    assert_eq!(body["error"]["code"], "EMPTY_FILE");
}

#[tokio::test]
async fn test_undecodable_push_is_rejected() {
    let h = Harness::new();
    let push = json!({ "message": { "data": "not base64!" } });

    let (status, body) = send(app(&h), post_json("/deliveries", push)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disposition"], "REJECTED");
    assert_eq!(body["error"]["code"], "INVALID_ENVELOPE");
}

#[tokio::test]
async fn test_unrecognized_body_is_bad_request() {
    let h = Harness::new();
    let (status, body) = send(app(&h), post_json("/deliveries", json!({ "unexpected": true }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);
}

#[tokio::test]
async fn test_get_file_record() {
    let h = Harness::new();
    let content = orders_file(4);
    let envelope = h.land("landing/orders/a.csv", &content);
    h.orchestrator.process(envelope).await;

    let fp = FileFingerprint::of(content.as_bytes());
    let (status, body) = send(app(&h), get(&format!("/files/{}", fp))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "HANDOFF_SUCCEEDED");
    assert_eq!(body["rowCountRepaired"], 4);
}

#[tokio::test]
async fn test_get_unknown_and_malformed_fingerprints() {
    let h = Harness::new();

    let unknown = FileFingerprint::of(b"never delivered");
    let (status, _) = send(app(&h), get(&format!("/files/{}", unknown))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(app(&h), get("/files/not-a-fingerprint")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], 400);
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new();
    let (status, body) = send(app(&h), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
}
