//! API Endpoint Tests
//!
//! Tests for:
//! - Change notification intake
//! - Health and readiness endpoints

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use adc_api::{evaluation_router, health_router, HealthState};
use adc_rules::ComplianceEvaluator;
use adc_store::InMemoryConfigStore;
use adc_sync::SyncState;

fn notification(status: &str, flags: &str) -> String {
    let invoking = serde_json::json!({
        "configurationItem": {
            "resourceType": "MyCompany::AD::User",
            "resourceId": "jdoe",
            "configurationItemStatus": status,
            "configurationItemCaptureTime": "2024-03-01T12:00:00.000Z",
            "configuration": { "userAccountControl": flags }
        }
    });
    serde_json::json!({
        "invokingEvent": invoking.to_string(),
        "resultToken": "token-1"
    })
    .to_string()
}

fn post_evaluate(body: String) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/evaluate")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_evaluate_reports_verdict() {
    let store = Arc::new(InMemoryConfigStore::new());
    let app = evaluation_router(Arc::new(ComplianceEvaluator::new(store.clone())));

    let response = app.oneshot(post_evaluate(notification("OK", "66048"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["compliance_type"], "NON_COMPLIANT");
    assert_eq!(json["result_token"], "token-1");
    assert_eq!(store.evaluations().len(), 1);
}

#[tokio::test]
async fn test_evaluate_malformed_item_is_unprocessable() {
    let store = Arc::new(InMemoryConfigStore::new());
    let app = evaluation_router(Arc::new(ComplianceEvaluator::new(store.clone())));

    let response = app.oneshot(post_evaluate(notification("OK", "never"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "data");
    assert!(store.evaluations().is_empty());
}

#[tokio::test]
async fn test_health_without_scheduler() {
    let app = health_router(HealthState::default());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "UP");

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_not_ready_before_first_sync() {
    let app = health_router(HealthState {
        sync_state: Some(Arc::new(SyncState::new())),
        metrics: None,
    });

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
