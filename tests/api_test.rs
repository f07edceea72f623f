use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use ledgerflow::api::{self, AppState};
use ledgerflow::drivers::DriverRegistry;
use ledgerflow::ledger::FjallStore;
use ledgerflow::observability::Metrics;
use ledgerflow::replication::{Manager, ManagerOptions};

/// Builds a test app over a throwaway Fjall store
async fn build_test_app() -> (Router, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store =
        FjallStore::open(temp_dir.path().join("store")).expect("Failed to open test Fjall store");

    let manager = Manager::with_registry(
        Arc::new(store.clone()),
        Arc::new(DriverRegistry::with_defaults()),
        ManagerOptions::default(),
        Arc::new(Metrics::new()),
    );

    (api::router(AppState::new(manager, store)), temp_dir)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .body(Body::empty())
        .unwrap()
}

/// Sends a request and returns status plus the JSON body (null when empty)
async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request)
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(
            String::from_utf8_lossy(&body).into_owned(),
        ))
    };
    (status, value)
}

async fn create_noop_exporter(app: &Router) -> String {
    let (status, body) = send(
        app,
        json_request("POST", "/exporters", json!({"driver": "noop", "config": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (app, _temp_dir) = build_test_app().await;

    let (status, body) = send(&app, empty_request("GET", "/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn test_create_and_get_exporter() {
    let (app, _temp_dir) = build_test_app().await;

    let id = create_noop_exporter(&app).await;

    let (status, body) = send(&app, empty_request("GET", &format!("/exporters/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["driver"], "noop");

    let (status, body) = send(&app, empty_request("GET", "/exporters")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_exporter_unknown_driver() {
    let (app, _temp_dir) = build_test_app().await;

    let (status, body) = send(
        &app,
        json_request("POST", "/exporters", json!({"driver": "kafka", "config": {}})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_CONFIGURATION");
}

#[tokio::test]
async fn test_create_exporter_invalid_driver_config() {
    let (app, _temp_dir) = build_test_app().await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/exporters",
            json!({"driver": "http", "config": {"url": "ftp://sink"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_CONFIGURATION");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/exporters",
            json!({"driver": "noop", "config": {"batching": {"maxItem": 5}}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was stored
    let (_, body) = send(&app, empty_request("GET", "/exporters")).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_payload() {
    let (app, _temp_dir) = build_test_app().await;

    let request = Request::builder()
        .uri("/exporters")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn test_exporter_not_found() {
    let (app, _temp_dir) = build_test_app().await;

    let (status, body) = send(&app, empty_request("GET", "/exporters/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(&app, empty_request("DELETE", "/exporters/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        json_request("PUT", "/exporters/missing", json!({"driver": "noop"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_and_delete_exporter() {
    let (app, _temp_dir) = build_test_app().await;
    let id = create_noop_exporter(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            &format!("/exporters/{id}"),
            json!({"driver": "stdout", "config": {"pretty": true}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, empty_request("GET", &format!("/exporters/{id}"))).await;
    assert_eq!(body["driver"], "stdout");
    assert_eq!(body["config"]["pretty"], true);

    let (status, _) = send(&app, empty_request("DELETE", &format!("/exporters/{id}"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, empty_request("GET", &format!("/exporters/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_append_logs_assigns_ids() {
    let (app, _temp_dir) = build_test_app().await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/ledgers/orders/logs",
            json!([
                {"type": "NEW_TRANSACTION", "payload": {"amount": 10}},
                {"type": "SET_METADATA"}
            ]),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let ids: Vec<u64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|log| log["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);

    let (_, body) = send(
        &app,
        json_request("POST", "/ledgers/orders/logs", json!([{"type": "REVERT"}])),
    )
    .await;
    assert_eq!(body["data"][0]["id"], 3);

    let (status, body) = send(&app, empty_request("GET", "/ledgers/orders")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "orders");

    let (_, body) = send(&app, empty_request("GET", "/ledgers")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ledger_errors() {
    let (app, _temp_dir) = build_test_app().await;

    let (status, _) = send(&app, empty_request("GET", "/ledgers/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        json_request("POST", "/ledgers/a:b/logs", json!([{"type": "X"}])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn test_pipeline_lifecycle() {
    let (app, _temp_dir) = build_test_app().await;
    let exporter_id = create_noop_exporter(&app).await;

    send(
        &app,
        json_request("POST", "/ledgers/orders/logs", json!([{"type": "A"}])),
    )
    .await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/pipelines",
            json!({"ledger": "orders", "exporter_id": exporter_id}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["enabled"], true);
    let id = body["id"].as_str().unwrap().to_string();

    // Created pipelines start right away
    let (status, body) = send(&app, empty_request("POST", &format!("/pipelines/{id}/start"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, _) = send(&app, empty_request("POST", &format!("/pipelines/{id}/stop"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = send(&app, empty_request("POST", &format!("/pipelines/{id}/stop"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, empty_request("POST", &format!("/pipelines/{id}/start"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = send(&app, empty_request("POST", &format!("/pipelines/{id}/reset"))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&app, empty_request("GET", "/pipelines")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], id.as_str());

    let (status, _) = send(&app, empty_request("DELETE", &format!("/pipelines/{id}"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, empty_request("GET", &format!("/pipelines/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, empty_request("GET", "/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pipelines_started"], 3);
    assert_eq!(body["pipelines_stopped"], 3);
}

#[tokio::test]
async fn test_create_pipeline_unknown_exporter() {
    let (app, _temp_dir) = build_test_app().await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/pipelines",
            json!({"ledger": "orders", "exporter_id": "missing"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_pipeline_action_not_found() {
    let (app, _temp_dir) = build_test_app().await;

    for action in ["start", "stop", "reset"] {
        let (status, _) = send(
            &app,
            empty_request("POST", &format!("/pipelines/missing/{action}")),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "action {action}");
    }
}
