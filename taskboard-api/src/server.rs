//! HTTP surface of the privileged API.
//!
//! Two POST routes forward to an [`AdminBackend`]. When no elevated
//! credential is configured the state holds no backend and both routes
//! answer `500` with a `misconfigured` error body.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use taskboard_proto::api::{
    ApiErrorBody, ApiErrorCode, COMPLETE_TASKS_PATH, CompleteTasksRequest, CompleteTasksResponse,
    UPSERT_PROFILE_PATH, UpsertProfileRequest, UpsertProfileResponse,
};

use crate::backend::{AdminBackend, BackendError};

/// Message returned when the service credential is absent.
pub const MISCONFIGURED_MESSAGE: &str = "Server misconfigured: missing service role key";

/// Shared state of the API server.
pub struct ApiState<B> {
    backend: Option<B>,
}

impl<B: AdminBackend> ApiState<B> {
    /// State forwarding to `backend`.
    pub const fn new(backend: B) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// State without a backend; every privileged call is refused.
    pub const fn unconfigured() -> Self {
        Self { backend: None }
    }

    /// The configured backend, if any.
    pub const fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    fn require_backend(&self) -> Result<&B, ApiError> {
        self.backend.as_ref().ok_or(ApiError::Misconfigured)
    }
}

/// Errors a handler can answer with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Required input was missing or the body could not be decoded.
    #[error("{0}")]
    BadRequest(&'static str),

    /// No service credential is configured.
    #[error("server misconfigured: missing service role key")]
    Misconfigured,

    /// The backend failed the operation.
    #[error("{message}")]
    Backend {
        /// Summary of the failed operation.
        message: &'static str,
        /// Underlying backend error.
        source: BackendError,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody::new(ApiErrorCode::BadRequest, *msg),
            ),
            Self::Misconfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody::new(ApiErrorCode::Misconfigured, MISCONFIGURED_MESSAGE),
            ),
            Self::Backend { message, source } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody::new(ApiErrorCode::Backend, *message).with_details(source.details()),
            ),
        };
        (status, Json(body)).into_response()
    }
}

async fn complete_tasks<B: AdminBackend>(
    State(state): State<Arc<ApiState<B>>>,
    body: Result<Json<CompleteTasksRequest>, JsonRejection>,
) -> Result<Json<CompleteTasksResponse>, ApiError> {
    let ids = body
        .ok()
        .and_then(|Json(req)| req.ids)
        .filter(|ids| !ids.is_empty())
        .ok_or(ApiError::BadRequest("Missing task ids"))?;

    let backend = state.require_backend()?;
    match backend.complete_tasks(&ids, Utc::now()).await {
        Ok(updated) => {
            tracing::info!(
                requested = ids.len(),
                updated = updated.len(),
                "bulk completed tasks"
            );
            Ok(Json(CompleteTasksResponse { updated }))
        }
        Err(e) => {
            tracing::error!(error = %e, requested = ids.len(), "bulk complete failed");
            Err(ApiError::Backend {
                message: "Failed to complete tasks",
                source: e,
            })
        }
    }
}

async fn upsert_profile<B: AdminBackend>(
    State(state): State<Arc<ApiState<B>>>,
    body: Result<Json<UpsertProfileRequest>, JsonRejection>,
) -> Result<Json<UpsertProfileResponse>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let id = req
        .id
        .filter(|id| !id.as_str().is_empty())
        .ok_or(ApiError::BadRequest("Missing user id"))?;

    let backend = state.require_backend()?;
    if let Err(e) = backend.upsert_profile(&id, req.email.as_deref()).await {
        tracing::error!(error = %e, user = %id, "profile upsert failed");
        return Err(ApiError::Backend {
            message: "Failed to upsert profile",
            source: e,
        });
    }
    tracing::info!(user = %id, "profile upserted");
    Ok(Json(UpsertProfileResponse { id }))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Builds the router for `state`.
pub fn router<B: AdminBackend + 'static>(state: Arc<ApiState<B>>) -> axum::Router {
    axum::Router::new()
        .route(COMPLETE_TASKS_PATH, axum::routing::post(complete_tasks::<B>))
        .route(UPSERT_PROFILE_PATH, axum::routing::post(upsert_profile::<B>))
        .route("/healthz", axum::routing::get(healthz))
        .with_state(state)
}

/// Starts the API server on `addr` and returns the bound address and a
/// join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state<B: AdminBackend + 'static>(
    addr: &str,
    state: Arc<ApiState<B>>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "api server error");
        }
    });

    Ok((bound_addr, handle))
}
