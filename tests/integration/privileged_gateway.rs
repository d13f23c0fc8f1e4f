//! Integration tests for the REST gateway's privileged calls against an
//! in-process `taskboard-api` server.
//!
//! Checks that a missing service credential on the server reaches the client
//! as a configuration error, distinct from ordinary failures.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use taskboard::account;
use taskboard::gateway::rest::{RestGateway, RestSettings};
use taskboard::gateway::{Gateway, GatewayError};
use taskboard::session::Session;
use taskboard_api::backend::{BackendError, MemoryBackend};
use taskboard_api::server::{ApiState, start_server_with_state};
use taskboard_proto::{TaskId, UserId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn make_api(state: ApiState<MemoryBackend>) -> (String, Arc<ApiState<MemoryBackend>>) {
    let state = Arc::new(state);
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("api server should start");
    (format!("http://{addr}"), state)
}

fn make_gateway(api_url: &str) -> RestGateway {
    RestGateway::new(&RestSettings {
        backend_url: "http://127.0.0.1:9".to_string(),
        api_key: "anon-key".to_string(),
        api_url: api_url.to_string(),
        access_token: "user-token".to_string(),
        heartbeat: Duration::from_secs(30),
    })
    .expect("settings should be valid")
}

fn make_backend(ids: &[&str]) -> MemoryBackend {
    let backend = MemoryBackend::new();
    for id in ids {
        backend.seed_task(&TaskId::new(*id));
    }
    backend
}

// ---------------------------------------------------------------------------
// Bulk complete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bulk_complete_returns_server_confirmed_subset() {
    let (url, state) = make_api(ApiState::new(make_backend(&["t-1"]))).await;
    let gw = make_gateway(&url);

    let updated = gw
        .bulk_complete_tasks(&[TaskId::new("t-1"), TaskId::new("t-2")])
        .await
        .unwrap();

    assert_eq!(updated, vec![TaskId::new("t-1")]);
    let backend = state.backend().unwrap();
    assert!(backend.completed_at(&TaskId::new("t-1")).is_some());
}

#[tokio::test]
async fn bulk_complete_without_server_credential_is_configuration_error() {
    let (url, _) = make_api(ApiState::unconfigured()).await;
    let gw = make_gateway(&url);

    let err = gw
        .bulk_complete_tasks(&[TaskId::new("t-1")])
        .await
        .unwrap_err();

    assert!(err.is_configuration(), "got {err:?}");
}

#[tokio::test]
async fn backend_failure_is_data_access_with_details() {
    let backend = make_backend(&["t-1"]);
    backend.fail_next(BackendError::Request("connection reset".to_string()));
    let (url, _) = make_api(ApiState::new(backend)).await;
    let gw = make_gateway(&url);

    let err = gw
        .bulk_complete_tasks(&[TaskId::new("t-1")])
        .await
        .unwrap_err();

    match err {
        GatewayError::DataAccess(msg) => assert!(msg.contains("connection reset"), "{msg}"),
        other => panic!("expected data access error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_bulk_complete_skips_the_request() {
    // Nothing listens on this address; an actual request would fail.
    let gw = make_gateway("http://127.0.0.1:9");
    assert_eq!(gw.bulk_complete_tasks(&[]).await, Ok(Vec::new()));
}

#[tokio::test]
async fn unreachable_api_is_data_access() {
    let gw = make_gateway("http://127.0.0.1:9");
    let err = gw
        .bulk_complete_tasks(&[TaskId::new("t-1")])
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::DataAccess(_)), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Profile upsert
// ---------------------------------------------------------------------------

#[tokio::test]
async fn profile_sync_upserts_through_api() {
    let (url, state) = make_api(ApiState::new(MemoryBackend::new())).await;
    let gw = make_gateway(&url);
    let session = Session::new(
        UserId::new("u-1"),
        "user-token",
        Some("u1@example.com".to_string()),
    );

    assert!(account::sync_profile(&gw, &session).await);
    let backend = state.backend().unwrap();
    assert_eq!(
        backend.profile(&UserId::new("u-1")),
        Some(Some("u1@example.com".to_string()))
    );
}

#[tokio::test]
async fn profile_sync_failure_is_not_fatal() {
    let (url, _) = make_api(ApiState::unconfigured()).await;
    let gw = make_gateway(&url);
    let session = Session::new(UserId::new("u-1"), "user-token", None);

    assert!(!account::sync_profile(&gw, &session).await);
    let err = gw
        .upsert_profile(&UserId::new("u-1"), None)
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}
