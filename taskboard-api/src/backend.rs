//! Backend access with the elevated service credential.
//!
//! [`AdminBackend`] is the seam between the HTTP handlers and the storage
//! backend. [`PostgrestBackend`] talks to a PostgREST-style REST API with the
//! service key; [`MemoryBackend`] keeps rows in memory for tests.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;

use taskboard_proto::{TaskId, UserId};

/// Errors from the privileged backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("backend rejected the request with status {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, as far as it could be read.
        body: String,
    },
}

impl BackendError {
    /// Detail text for the error body.
    #[must_use]
    pub fn details(&self) -> String {
        match self {
            Self::Request(msg) => msg.clone(),
            Self::Rejected { body, .. } => body.clone(),
        }
    }
}

/// Operations that need the elevated credential.
pub trait AdminBackend: Send + Sync {
    /// Sets `completed = true` and `completed_at = now` on every task in
    /// `ids` and returns the ids that were actually updated.
    fn complete_tasks(
        &self,
        ids: &[TaskId],
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<TaskId>, BackendError>> + Send;

    /// Inserts or updates the profile row keyed by `id`.
    fn upsert_profile(
        &self,
        id: &UserId,
        email: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;
}

// ---------------------------------------------------------------------------
// PostgREST
// ---------------------------------------------------------------------------

/// [`AdminBackend`] over PostgREST with the service key.
pub struct PostgrestBackend {
    http: reqwest::Client,
    rest_base: String,
    service_key: String,
}

#[derive(Deserialize)]
struct IdRow {
    id: TaskId,
}

impl PostgrestBackend {
    /// Builds a backend client for `backend_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Request`] if the HTTP client cannot be built.
    pub fn new(backend_url: &str, service_key: impl Into<String>) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self {
            http,
            rest_base: format!("{}/rest/v1", backend_url.trim_end_matches('/')),
            service_key: service_key.into(),
        })
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{table}", self.rest_base))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl AdminBackend for PostgrestBackend {
    async fn complete_tasks(
        &self,
        ids: &[TaskId],
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, BackendError> {
        let list: Vec<&str> = ids.iter().map(TaskId::as_str).collect();
        let resp = self
            .request(reqwest::Method::PATCH, "tasks")
            .query(&[
                ("id", format!("in.({})", list.join(","))),
                ("select", "id".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&json!({ "completed": true, "completed_at": now }))
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let rows: Vec<IdRow> = ensure_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Request(format!("invalid response body: {e}")))?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn upsert_profile(&self, id: &UserId, email: Option<&str>) -> Result<(), BackendError> {
        let resp = self
            .request(reqwest::Method::POST, "profiles")
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!([{ "id": id, "email": email }]))
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        ensure_success(resp).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryTables {
    completed_at: HashMap<TaskId, Option<DateTime<Utc>>>,
    profiles: HashMap<UserId, Option<String>>,
}

/// [`AdminBackend`] holding task completion state and profiles in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<MemoryTables>,
    fail_next: Mutex<Option<BackendError>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an incomplete task.
    pub fn seed_task(&self, id: &TaskId) {
        self.tables.lock().completed_at.insert(id.clone(), None);
    }

    /// Makes the next call fail with `error`.
    pub fn fail_next(&self, error: BackendError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Completion time of a task, `None` if incomplete or unknown.
    #[must_use]
    pub fn completed_at(&self, id: &TaskId) -> Option<DateTime<Utc>> {
        self.tables.lock().completed_at.get(id).copied().flatten()
    }

    /// Email stored for a profile, if the profile exists.
    #[must_use]
    pub fn profile(&self, id: &UserId) -> Option<Option<String>> {
        self.tables.lock().profiles.get(id).cloned()
    }

    fn take_failure(&self) -> Result<(), BackendError> {
        self.fail_next.lock().take().map_or(Ok(()), Err)
    }
}

impl AdminBackend for MemoryBackend {
    async fn complete_tasks(
        &self,
        ids: &[TaskId],
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, BackendError> {
        self.take_failure()?;
        let mut tables = self.tables.lock();
        let mut updated = Vec::new();
        for id in ids {
            if let Some(slot) = tables.completed_at.get_mut(id) {
                *slot = Some(now);
                updated.push(id.clone());
            }
        }
        Ok(updated)
    }

    async fn upsert_profile(&self, id: &UserId, email: Option<&str>) -> Result<(), BackendError> {
        self.take_failure()?;
        self.tables
            .lock()
            .profiles
            .insert(id.clone(), email.map(String::from));
        Ok(())
    }
}
