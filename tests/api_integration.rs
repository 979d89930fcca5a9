//! Integration tests for the status API
//!
//! Tests API endpoints against mailboxes filled by hand

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use jigctl::core::{create_router, ApiState, LatestValueMailbox};
use jigctl::types::{JigPhase, JigStatus, PipelineOutcome, RunResult, TelemetrySample};
use serde_json::Value;
use tower::ServiceExt;

fn state() -> ApiState {
    ApiState::new(Arc::new(LatestValueMailbox::new()), Arc::new(LatestValueMailbox::new()))
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Option<Value>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).ok())
}

#[tokio::test]
async fn test_health_endpoint() {
    let (status, json) = get_json(create_router(state()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json = json.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], jigctl::VERSION);
    assert_eq!(json["status_published"], false);
}

#[tokio::test]
async fn test_status_unavailable_before_first_publish() {
    let (status, _) = get_json(create_router(state()), "/status").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_status_returns_latest_snapshot() {
    let state = state();
    state.status.publish(JigStatus::new(JigPhase::Waiting, 0, None, "A01", "1.02.03"));
    let result = RunResult::completed(PipelineOutcome::Success, Duration::from_millis(1500));
    state
        .status
        .publish(JigStatus::new(JigPhase::AwaitingRemoval, 1, Some(result), "A01", "1.02.03"));

    let (status, json) = get_json(create_router(state), "/status").await;
    assert_eq!(status, StatusCode::OK);
    let json = json.unwrap();
    assert_eq!(json["phase"], "AWAITING_REMOVAL");
    assert_eq!(json["device_count"], 1);
    assert_eq!(json["last_result"]["code"], 0);
    assert_eq!(json["last_result"]["resolution"], "COMPLETED");
}

#[tokio::test]
async fn test_telemetry_404_until_sample() {
    let state = state();
    let (status, _) = get_json(create_router(state.clone()), "/telemetry").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state
        .telemetry
        .publish(TelemetrySample::parse_line("{\"generator_freq\": 61000}").unwrap());
    let (status, json) = get_json(create_router(state), "/telemetry").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.unwrap()["fields"]["generator_freq"], 61000);
}

#[tokio::test]
async fn test_unknown_route_404() {
    let (status, _) = get_json(create_router(state()), "/session/new").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
