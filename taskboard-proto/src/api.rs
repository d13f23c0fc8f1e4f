//! Request and response bodies of the privileged forwarding API.
//!
//! The API holds the backend's elevated credential and exposes exactly two
//! operations the end-user credential cannot perform: bulk completion of
//! tasks and profile upsert.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{TaskId, UserId};

/// Path of the bulk-complete endpoint.
pub const COMPLETE_TASKS_PATH: &str = "/api/tasks/complete";

/// Path of the profile upsert endpoint.
pub const UPSERT_PROFILE_PATH: &str = "/api/users";

/// Body of `POST /api/tasks/complete`.
///
/// `ids` is optional on the wire so that a missing field yields a
/// `bad_request` error body rather than a decoder rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTasksRequest {
    /// Tasks to mark completed.
    #[serde(default)]
    pub ids: Option<Vec<TaskId>>,
}

/// Successful response of `POST /api/tasks/complete`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTasksResponse {
    /// The ids the backend actually updated; a subset of the request.
    #[serde(default)]
    pub updated: Vec<TaskId>,
}

/// Body of `POST /api/users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertProfileRequest {
    /// Profile id, equal to the auth user id.
    #[serde(default)]
    pub id: Option<UserId>,
    /// Email recorded on the profile.
    #[serde(default)]
    pub email: Option<String>,
}

/// Successful response of `POST /api/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertProfileResponse {
    /// The upserted profile id.
    pub id: UserId,
}

/// Machine-readable error class in [`ApiErrorBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    /// The request body was missing required fields or malformed.
    BadRequest,
    /// The server has no elevated credential configured.
    Misconfigured,
    /// The backend rejected or failed the operation.
    Backend,
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest => f.write_str("bad_request"),
            Self::Misconfigured => f.write_str("misconfigured"),
            Self::Backend => f.write_str("backend"),
        }
    }
}

/// Error body returned by every privileged endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Backend detail, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Error class. Absent in bodies from older servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ApiErrorCode>,
}

impl ApiErrorBody {
    /// Builds an error body without details.
    pub fn new(code: ApiErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            code: Some(code),
        }
    }

    /// Attaches backend details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
