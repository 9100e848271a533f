//! HTTP surface tests driving the router directly

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::*;
use sentinel_chain::api::{build_router, AppState};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

fn test_app() -> (TempDir, Router) {
    let dir = tempdir().unwrap();
    let state = AppState::new(open_log(dir.path()));
    let app = build_router(state, &["*".to_string()]);
    (dir, app)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn post_json(uri: &str, value: &Value) -> Request<Body> {
    post(uri, value.to_string())
}

#[tokio::test]
async fn test_health_check() {
    let (_dir, app) = test_app();
    let (status, body) = send(&app, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "version": "1.0"}));
}

#[tokio::test]
async fn test_get_chain_starts_with_genesis() {
    let (_dir, app) = test_app();
    let (status, body) = send(&app, get("/chain")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["length"], 1);
    assert_eq!(body["chain"][0]["previous_hash"], "0");
    assert_eq!(body["chain"][0]["data"]["type"], "genesis");
}

#[tokio::test]
async fn test_add_threat_then_duplicate() {
    let (_dir, app) = test_app();
    let threat = json!({
        "type": "malware_detected",
        "details": {"ip": "10.0.0.1"}
    });

    let (status, body) = send(&app, post_json("/threat", &threat)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Threat added successfully!");
    assert_eq!(body["new_entry"]["data"], threat);

    let (_, chain) = send(&app, get("/chain")).await;
    assert_eq!(chain["length"], 2);
    assert_eq!(body["new_entry"]["previous_hash"], chain["chain"][0]["hash"]);

    let (status, body) = send(&app, post_json("/threat", &threat)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("Duplicate"));

    let (_, chain) = send(&app, get("/chain")).await;
    assert_eq!(chain["length"], 2);
}

#[tokio::test]
async fn test_add_threat_validation_errors() {
    let (_dir, app) = test_app();

    let cases = vec![
        (post("/threat", "not json"), "Invalid threat data"),
        (post_json("/threat", &json!(["a"])), "Threat data must be a JSON object"),
        (post_json("/threat", &json!({"details": {}})), "Missing required field: type"),
        (post_json("/threat", &json!({"type": "data_breach"})), "Missing required field: details"),
        (
            post_json("/threat", &json!({"type": "port_scan", "details": {}})),
            "Invalid threat type. Must be one of: suspicious_login, malware_detected, unauthorized_access, data_breach",
        ),
        (
            post_json("/threat", &json!({"type": "data_breach", "details": [1]})),
            "Details must be a JSON object",
        ),
    ];

    for (request, expected) in cases {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], expected);
    }

    let (_, chain) = send(&app, get("/chain")).await;
    assert_eq!(chain["length"], 1);
}

#[tokio::test]
async fn test_verify_valid_chain() {
    let (_dir, app) = test_app();
    for n in 0..2 {
        send(&app, post_json("/threat", &threat("suspicious_login", n))).await;
    }

    let (status, body) = send(&app, get("/verify")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Chain is valid");
    assert_eq!(body["length"], 3);
}

#[tokio::test]
async fn test_verify_reports_tampering() {
    let (dir, app) = test_app();
    send(&app, post_json("/threat", &threat("data_breach", 1))).await;

    tamper_entry(dir.path(), 1, |entry| {
        entry["data"]["details"]["ip"] = json!("192.168.0.1");
    });

    let (status, body) = send(&app, get("/verify")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["index"], 1);
    assert!(body["error"].as_str().unwrap().contains("index 1"));
}

#[tokio::test]
async fn test_reset() {
    let (_dir, app) = test_app();
    send(&app, post_json("/threat", &threat("unauthorized_access", 1))).await;

    let (status, body) = send(&app, post("/reset", Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chain"].as_array().unwrap().len(), 1);

    let (_, chain) = send(&app, get("/chain")).await;
    assert_eq!(chain["length"], 1);
}

#[tokio::test]
async fn test_cors_preflight() {
    let (_dir, app) = test_app();
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/threat")
        .header(header::ORIGIN, "https://dashboard.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
