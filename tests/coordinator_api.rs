use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

use fetchmesh::api::models::{
    AssignResponse, ReassignResponse, RegisterResponse, UploadResponse,
};
use fetchmesh::api::{AppState, build_router};
use fetchmesh::config::Config;
use fetchmesh::registry::{TaskSnapshot, TaskStatus};
use fetchmesh::relay::RelayStore;

/// Builds a coordinator app with an in-memory relay and short dispatch
/// retries so tests never wait on backoff.
fn build_test_app() -> Router {
    let mut config = Config::default();
    config.coordinator.dispatch_retry.max_attempts = 1;
    config.coordinator.dispatch_retry.backoff_ms = 10;

    let state = AppState::new(config, RelayStore::in_memory());
    build_router(state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json<T: serde::de::DeserializeOwned>(
    response: axum::response::Response,
) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn register(app: &Router, node_id: &str) {
    let response = app
        .clone()
        .oneshot(post_json("/nodes/register", json!({ "node_id": node_id })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn assign(app: &Router, url: &str, node_id: &str) -> AssignResponse {
    let response = app
        .clone()
        .oneshot(post_json(
            "/tasks/assign",
            json!({ "url": url, "node_id": node_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await
}

async fn node_task_urls(app: &Router, node_id: &str) -> Vec<String> {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/nodes/{node_id}/tasks"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response_json(response).await;
    body["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["url"].as_str().unwrap().to_string())
        .collect()
}

async fn get_task(app: &Router, url: &str) -> TaskSnapshot {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/tasks?url={}", urlencode(url)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await
}

fn urlencode(s: &str) -> String {
    s.replace(':', "%3A").replace('/', "%2F")
}

#[tokio::test]
async fn test_register_node() {
    let app = build_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/nodes/register", json!({ "node_id": "a" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: RegisterResponse = response_json(response).await;
    assert_eq!(body.status, "success");
    assert_eq!(body.node_id, "a");
}

#[tokio::test]
async fn test_register_rejects_empty_node_id() {
    let app = build_test_app();

    let response = app
        .oneshot(post_json("/nodes/register", json!({ "node_id": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["reason"], "invalid_payload");
}

#[tokio::test]
async fn test_assign_creates_task_once() {
    let app = build_test_app();
    register(&app, "a").await;
    register(&app, "b").await;

    let first = assign(&app, "http://cdn/video1", "a").await;
    assert_eq!(first.task.status, TaskStatus::Pending);
    assert_eq!(first.task.assigned_to, "a");

    // Re-submission of the same URL updates the same task
    let second = assign(&app, "http://cdn/video1", "b").await;
    assert_eq!(second.task.assigned_to, "b");
    assert_eq!(second.task.created_at, first.task.created_at);

    assert!(node_task_urls(&app, "a").await.is_empty());
    assert_eq!(node_task_urls(&app, "b").await, vec!["http://cdn/video1"]);
}

#[tokio::test]
async fn test_notify_success_unknown_url_is_acked() {
    let app = build_test_app();
    register(&app, "a").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/tasks/success",
            json!({ "node_id": "a", "url": "http://cdn/ghost", "output_path": "/out" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response_json(response).await;
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn test_notify_node_unknown_url_is_acked() {
    let app = build_test_app();

    let response = app
        .oneshot(post_json(
            "/tasks/notify",
            json!({
                "source_node": "a",
                "target_node": "b",
                "url": "http://cdn/ghost",
                "output_path": "/out"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// End-to-end scenario: A fails, the task moves to B atomically.
#[tokio::test]
async fn test_failure_reassigns_to_other_node() {
    let app = build_test_app();
    register(&app, "a").await;
    register(&app, "b").await;
    assign(&app, "http://cdn/url1", "a").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/tasks/reassign",
            json!({ "node_id": "a", "url": "http://cdn/url1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: ReassignResponse = response_json(response).await;
    assert_eq!(body.status, "success");
    assert_eq!(body.reassigned_to, "b");

    let task = get_task(&app, "http://cdn/url1").await;
    assert_eq!(task.status, TaskStatus::Reassigned);
    assert_eq!(task.reassigned_from.as_deref(), Some("a"));

    assert!(node_task_urls(&app, "a").await.is_empty());
    assert_eq!(node_task_urls(&app, "b").await, vec!["http://cdn/url1"]);
}

/// End-to-end scenario: the only node fails; the error result is explicit
/// and no node owns the task afterwards.
#[tokio::test]
async fn test_reassignment_with_single_node_errors() {
    let app = build_test_app();
    register(&app, "a").await;
    assign(&app, "http://cdn/url2", "a").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/tasks/reassign",
            json!({ "node_id": "a", "url": "http://cdn/url2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = response_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["reason"], "no_available_nodes");

    assert!(node_task_urls(&app, "a").await.is_empty());
}

#[tokio::test]
async fn test_reassignment_unknown_task_errors() {
    let app = build_test_app();
    register(&app, "a").await;
    register(&app, "b").await;

    let response = app
        .oneshot(post_json(
            "/tasks/reassign",
            json!({ "node_id": "a", "url": "http://cdn/ghost" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// End-to-end scenario: relay round-trip serves back the uploaded bytes
/// unchanged after a node-to-node completion.
#[tokio::test]
async fn test_relay_roundtrip() {
    let app = build_test_app();
    register(&app, "a").await;
    register(&app, "b").await;
    assign(&app, "http://cdn/url3", "a").await;

    let payload: &[u8] = b"not really an mp4 but byte-exact";
    let upload = Request::builder()
        .uri(format!("/relay?url={}", urlencode("http://cdn/url3")))
        .method("PUT")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(payload))
        .unwrap();
    let response = app.clone().oneshot(upload).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: UploadResponse = response_json(response).await;
    assert_eq!(body.status, "success");
    assert!(body.file_path.ends_with("url3.mp4"));

    let response = app
        .clone()
        .oneshot(post_json(
            "/tasks/notify",
            json!({
                "source_node": "a",
                "target_node": "b",
                "url": "http://cdn/url3",
                "output_path": "/out"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let task = get_task(&app, "http://cdn/url3").await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.completed_by.as_deref(), Some("a"));

    let download = Request::builder()
        .uri(format!("/relay?url={}", urlencode("http://cdn/url3")))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(download).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let served = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&served[..], payload);
}

#[tokio::test]
async fn test_relay_download_unknown_task_is_404() {
    let app = build_test_app();

    let request = Request::builder()
        .uri(format!("/relay?url={}", urlencode("http://cdn/ghost")))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_relay_download_without_upload_is_404() {
    let app = build_test_app();
    register(&app, "a").await;
    assign(&app, "http://cdn/url5", "a").await;

    let request = Request::builder()
        .uri(format!("/relay?url={}", urlencode("http://cdn/url5")))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_relay_upload_rejects_bad_content_type() {
    let app = build_test_app();
    register(&app, "a").await;
    assign(&app, "http://cdn/url6", "a").await;

    let upload = Request::builder()
        .uri(format!("/relay?url={}", urlencode("http://cdn/url6")))
        .method("PUT")
        .header(header::CONTENT_TYPE, "multipart/form-data")
        .body(Body::from("xx"))
        .unwrap();
    let response = app.oneshot(upload).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Race scenario: A's delayed success lands after the task moved to B.
/// Last writer wins: the task ends Completed with completed_by = A.
#[tokio::test]
async fn test_stale_success_after_reassignment() {
    let app = build_test_app();
    register(&app, "a").await;
    register(&app, "b").await;
    assign(&app, "http://cdn/url4", "a").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/tasks/reassign",
            json!({ "node_id": "a", "url": "http://cdn/url4" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(
            "/tasks/success",
            json!({ "node_id": "a", "url": "http://cdn/url4", "output_path": "/out" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let task = get_task(&app, "http://cdn/url4").await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.completed_by.as_deref(), Some("a"));
    assert_eq!(task.reassigned_to.as_deref(), Some("b"));
}

/// Live push path: an open event stream receives assignments as SSE
/// frames, and the delivered task flips to processing.
#[tokio::test]
async fn test_assign_pushes_over_live_event_stream() {
    let app = build_test_app();
    register(&app, "a").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/nodes/a/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let mut events = response.into_body();

    let assigned = assign(&app, "http://cdn/live1", "a").await;
    assert_eq!(assigned.task.status, TaskStatus::Processing);

    let frame = tokio::time::timeout(Duration::from_secs(2), events.frame())
        .await
        .expect("pushed event should arrive promptly")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert_eq!(
        text,
        "data: {\"type\":\"assignment\",\"url\":\"http://cdn/live1\"}\n\n"
    );
}

/// Reassignment events carry the failed origin node and land on the
/// target's stream.
#[tokio::test]
async fn test_reassignment_pushes_to_target_stream() {
    let app = build_test_app();
    register(&app, "a").await;
    register(&app, "b").await;
    assign(&app, "http://cdn/live2", "a").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/nodes/b/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut events = response.into_body();

    let response = app
        .clone()
        .oneshot(post_json(
            "/tasks/reassign",
            json!({ "node_id": "a", "url": "http://cdn/live2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let frame = tokio::time::timeout(Duration::from_secs(2), events.frame())
        .await
        .expect("pushed event should arrive promptly")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert_eq!(
        text,
        "data: {\"type\":\"reassignment\",\"url\":\"http://cdn/live2\",\"source_node\":\"a\"}\n\n"
    );
}

#[tokio::test]
async fn test_nodes_listed_in_registration_order() {
    let app = build_test_app();
    register(&app, "c").await;
    register(&app, "a").await;
    register(&app, "b").await;

    let response = app
        .oneshot(Request::builder().uri("/nodes").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response_json(response).await;
    let ids: Vec<&str> = body["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: Value = response_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert!(health["components"].is_object());
    assert!(health["metrics"]["tasks_assigned"].is_u64());
    assert!(health["version"].is_string());
}
