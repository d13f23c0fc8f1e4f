//! Integration tests for the privileged API over real HTTP.
//!
//! Starts the server in-process on an OS-assigned port with an in-memory
//! backend and drives it with `reqwest`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use taskboard_api::backend::{BackendError, MemoryBackend};
use taskboard_api::server::{ApiState, MISCONFIGURED_MESSAGE, start_server_with_state};
use taskboard_proto::api::{
    ApiErrorBody, ApiErrorCode, COMPLETE_TASKS_PATH, CompleteTasksResponse, UPSERT_PROFILE_PATH,
    UpsertProfileResponse,
};
use taskboard_proto::{TaskId, UserId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Starts a configured server and returns its base URL.
async fn make_server(backend: MemoryBackend) -> (String, Arc<ApiState<MemoryBackend>>) {
    let state = Arc::new(ApiState::new(backend));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("server should start");
    (format!("http://{addr}"), state)
}

/// Starts a server without a service credential.
async fn make_unconfigured_server() -> String {
    let state = Arc::new(ApiState::<MemoryBackend>::unconfigured());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", state)
        .await
        .expect("server should start");
    format!("http://{addr}")
}

fn make_backend(task_ids: &[&str]) -> MemoryBackend {
    let backend = MemoryBackend::new();
    for id in task_ids {
        backend.seed_task(&TaskId::new(*id));
    }
    backend
}

async fn post(url: &str, body: serde_json::Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("request should reach the server")
}

// ---------------------------------------------------------------------------
// Bulk complete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn complete_returns_updated_ids() {
    let (base, state) = make_server(make_backend(&["t-1", "t-2"])).await;

    let resp = post(
        &format!("{base}{COMPLETE_TASKS_PATH}"),
        json!({ "ids": ["t-1", "t-2"] }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: CompleteTasksResponse = resp.json().await.unwrap();
    assert_eq!(body.updated, vec![TaskId::new("t-1"), TaskId::new("t-2")]);
    let backend = state.backend().unwrap();
    assert!(backend.completed_at(&TaskId::new("t-1")).is_some());
}

#[tokio::test]
async fn complete_reports_partial_success() {
    let (base, _) = make_server(make_backend(&["t-1"])).await;

    let resp = post(
        &format!("{base}{COMPLETE_TASKS_PATH}"),
        json!({ "ids": ["t-1", "t-gone"] }),
    )
    .await;
    let body: CompleteTasksResponse = resp.json().await.unwrap();
    assert_eq!(body.updated, vec![TaskId::new("t-1")]);
}

#[tokio::test]
async fn complete_without_ids_is_bad_request() {
    let (base, _) = make_server(make_backend(&[])).await;
    let url = format!("{base}{COMPLETE_TASKS_PATH}");

    for body in [json!({}), json!({ "ids": [] }), json!({ "ids": "t-1" })] {
        let resp = post(&url, body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err: ApiErrorBody = resp.json().await.unwrap();
        assert_eq!(err.error, "Missing task ids");
        assert_eq!(err.code, Some(ApiErrorCode::BadRequest));
    }
}

#[tokio::test]
async fn complete_with_non_json_body_is_bad_request() {
    let (base, _) = make_server(make_backend(&[])).await;
    let resp = reqwest::Client::new()
        .post(format!("{base}{COMPLETE_TASKS_PATH}"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn complete_without_credential_is_misconfigured() {
    let base = make_unconfigured_server().await;

    let resp = post(
        &format!("{base}{COMPLETE_TASKS_PATH}"),
        json!({ "ids": ["t-1"] }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let err: ApiErrorBody = resp.json().await.unwrap();
    assert_eq!(err.error, MISCONFIGURED_MESSAGE);
    assert_eq!(err.code, Some(ApiErrorCode::Misconfigured));
}

#[tokio::test]
async fn complete_backend_failure_carries_details() {
    let backend = make_backend(&["t-1"]);
    backend.fail_next(BackendError::Rejected {
        status: 503,
        body: "database unavailable".to_string(),
    });
    let (base, _) = make_server(backend).await;

    let resp = post(
        &format!("{base}{COMPLETE_TASKS_PATH}"),
        json!({ "ids": ["t-1"] }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let err: ApiErrorBody = resp.json().await.unwrap();
    assert_eq!(err.code, Some(ApiErrorCode::Backend));
    assert_eq!(err.details.as_deref(), Some("database unavailable"));
}

// ---------------------------------------------------------------------------
// Profile upsert
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upsert_profile_stores_email() {
    let (base, state) = make_server(MemoryBackend::new()).await;

    let resp = post(
        &format!("{base}{UPSERT_PROFILE_PATH}"),
        json!({ "id": "u-1", "email": "a@example.com" }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: UpsertProfileResponse = resp.json().await.unwrap();
    assert_eq!(body.id, UserId::new("u-1"));

    // Second upsert overwrites rather than duplicating.
    let resp = post(
        &format!("{base}{UPSERT_PROFILE_PATH}"),
        json!({ "id": "u-1", "email": "b@example.com" }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let backend = state.backend().unwrap();
    assert_eq!(
        backend.profile(&UserId::new("u-1")),
        Some(Some("b@example.com".to_string()))
    );
}

#[tokio::test]
async fn upsert_profile_without_id_is_bad_request() {
    let (base, _) = make_server(MemoryBackend::new()).await;

    let resp = post(
        &format!("{base}{UPSERT_PROFILE_PATH}"),
        json!({ "email": "a@example.com" }),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: ApiErrorBody = resp.json().await.unwrap();
    assert_eq!(err.error, "Missing user id");
}

#[tokio::test]
async fn upsert_profile_without_credential_is_misconfigured() {
    let base = make_unconfigured_server().await;

    let resp = post(&format!("{base}{UPSERT_PROFILE_PATH}"), json!({ "id": "u-1" })).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let err: ApiErrorBody = resp.json().await.unwrap();
    assert_eq!(err.code, Some(ApiErrorCode::Misconfigured));
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthz_answers_ok() {
    let base = make_unconfigured_server().await;
    let resp = reqwest::get(format!("{base}/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");
}
