//! Integration tests for the health endpoint and general HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, TestApp};

#[tokio::test]
async fn health_reports_memory_mode_as_degraded() {
    let app = TestApp::new();
    let response = get(app.router(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["store_mode"], "memory");
    assert_eq!(json["store_healthy"], true);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = TestApp::new();
    let response = get(app.router(), "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = TestApp::new();
    let response = get(app.router(), "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}
