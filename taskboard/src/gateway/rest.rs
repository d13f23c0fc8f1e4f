//! Gateway for a PostgREST-style backend.
//!
//! Row reads and writes go to `{backend_url}/rest/v1/{table}` with the
//! project key and the user's access token. Bulk completion and profile
//! upsert go to the privileged API, which holds the elevated credential.
//! Change subscriptions are served by [`RealtimeHub`].

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use taskboard_proto::api::{
    ApiErrorBody, ApiErrorCode, COMPLETE_TASKS_PATH, CompleteTasksRequest, CompleteTasksResponse,
    UPSERT_PROFILE_PATH, UpsertProfileRequest,
};
use taskboard_proto::row;
use taskboard_proto::{
    ChangeEvent, List, ListId, NewList, NewTask, Table, Task, TaskId, TaskPatch, UserId,
};

use super::realtime::{RealtimeConfig, RealtimeHub};
use super::{Gateway, GatewayError, SubscriptionHandle};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything needed to reach the backend and the privileged API.
#[derive(Debug, Clone)]
pub struct RestSettings {
    /// Base URL of the backend project, e.g. `https://xyz.example.co`.
    pub backend_url: String,
    /// Public project key sent as `apikey`.
    pub api_key: String,
    /// Base URL of the privileged API.
    pub api_url: String,
    /// End-user access token.
    pub access_token: String,
    /// Realtime heartbeat interval.
    pub heartbeat: Duration,
}

/// [`Gateway`] over HTTP and the realtime WebSocket.
pub struct RestGateway {
    http: reqwest::Client,
    rest_base: String,
    api_base: String,
    api_key: String,
    access_token: String,
    realtime: RealtimeHub,
}

impl RestGateway {
    /// Builds the gateway; no connection is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] if a URL does not parse or the
    /// HTTP client cannot be built.
    pub fn new(settings: &RestSettings) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("http client: {e}")))?;

        let backend = settings.backend_url.trim_end_matches('/');
        Url::parse(&settings.api_url)
            .map_err(|e| GatewayError::Configuration(format!("invalid api url: {e}")))?;

        Ok(Self {
            http,
            rest_base: format!("{backend}/rest/v1"),
            api_base: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            access_token: settings.access_token.clone(),
            realtime: RealtimeHub::new(RealtimeConfig {
                url: realtime_url(backend, &settings.api_key)?,
                access_token: settings.access_token.clone(),
                heartbeat: settings.heartbeat,
            }),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_base)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.access_token)
    }

    async fn fetch_rows(&self, table: &str, query: &[(&str, String)]) -> Result<Value, GatewayError> {
        let resp = self
            .authorized(self.http.get(self.table_url(table)))
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(check(resp).await?).await
    }

    async fn write_rows(&self, builder: RequestBuilder) -> Result<Value, GatewayError> {
        let resp = self
            .authorized(builder)
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(transport_error)?;
        read_json(check(resp).await?).await
    }

    async fn tasks_query(&self, owner: &UserId, completed: Option<bool>) -> Result<Vec<Task>, GatewayError> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{owner}")),
            ("order", "created_at.asc".to_string()),
        ];
        if let Some(completed) = completed {
            query.push(("completed", format!("eq.{completed}")));
        }
        let rows = self.fetch_rows("tasks", &query).await?;
        Ok(row::tasks_from_json(rows)?)
    }
}

impl Gateway for RestGateway {
    async fn list_lists(&self, owner: &UserId) -> Result<Vec<List>, GatewayError> {
        let rows = self
            .fetch_rows(
                "lists",
                &[
                    ("select", "*".to_string()),
                    ("user_id", format!("eq.{owner}")),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await?;
        Ok(row::lists_from_json(rows)?)
    }

    async fn list_incomplete_tasks(&self, owner: &UserId) -> Result<Vec<Task>, GatewayError> {
        self.tasks_query(owner, Some(false)).await
    }

    async fn list_completed_tasks(&self, owner: &UserId) -> Result<Vec<Task>, GatewayError> {
        self.tasks_query(owner, Some(true)).await
    }

    async fn list_tasks(&self, owner: &UserId) -> Result<Vec<Task>, GatewayError> {
        self.tasks_query(owner, None).await
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, GatewayError> {
        let rows = self
            .fetch_rows(
                "tasks",
                &[("select", "*".to_string()), ("id", format!("eq.{id}"))],
            )
            .await?;
        Ok(row::tasks_from_json(rows)?.into_iter().next())
    }

    async fn get_lists_by_ids(&self, ids: &[ListId]) -> Result<Vec<List>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<&str> = ids.iter().map(ListId::as_str).collect();
        let rows = self
            .fetch_rows(
                "lists",
                &[("select", "*".to_string()), ("id", in_filter(&ids))],
            )
            .await?;
        Ok(row::lists_from_json(rows)?)
    }

    async fn bulk_complete_tasks(&self, ids: &[TaskId]) -> Result<Vec<TaskId>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = CompleteTasksRequest {
            ids: Some(ids.to_vec()),
        };
        let resp = self
            .http
            .post(format!("{}{COMPLETE_TASKS_PATH}", self.api_base))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let parsed: CompleteTasksResponse = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::DataAccess(format!("bad complete response: {e}")))?;
        tracing::debug!(
            requested = ids.len(),
            updated = parsed.updated.len(),
            "bulk complete confirmed"
        );
        Ok(parsed.updated)
    }

    async fn delete_tasks(&self, ids: &[TaskId]) -> Result<(), GatewayError> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = ids.iter().map(TaskId::as_str).collect();
        let resp = self
            .authorized(self.http.delete(self.table_url("tasks")))
            .query(&[("id", in_filter(&ids))])
            .send()
            .await
            .map_err(transport_error)?;
        check(resp).await?;
        Ok(())
    }

    async fn create_list(&self, list: &NewList) -> Result<List, GatewayError> {
        let rows = self
            .write_rows(self.http.post(self.table_url("lists")).json(list))
            .await?;
        row::lists_from_json(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::DataAccess("insert returned no list".to_string()))
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, GatewayError> {
        let rows = self
            .write_rows(self.http.post(self.table_url("tasks")).json(task))
            .await?;
        row::tasks_from_json(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::DataAccess("insert returned no task".to_string()))
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, GatewayError> {
        let rows = self
            .write_rows(
                self.http
                    .patch(self.table_url("tasks"))
                    .query(&[("id", format!("eq.{id}"))])
                    .json(patch),
            )
            .await?;
        row::tasks_from_json(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::DataAccess(format!("task not found: {id}")))
    }

    async fn subscribe_changes(
        &self,
        table: Table,
        events: mpsc::Sender<ChangeEvent>,
    ) -> Result<SubscriptionHandle, GatewayError> {
        self.realtime.subscribe(table, events).await
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.realtime.unsubscribe(&handle).await;
    }

    async fn upsert_profile(&self, id: &UserId, email: Option<&str>) -> Result<(), GatewayError> {
        let body = UpsertProfileRequest {
            id: Some(id.clone()),
            email: email.map(String::from),
        };
        let resp = self
            .http
            .post(format!("{}{UPSERT_PROFILE_PATH}", self.api_base))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check(resp).await?;
        Ok(())
    }
}

/// Builds the realtime WebSocket URL for a backend base URL.
///
/// # Errors
///
/// Returns [`GatewayError::Configuration`] if `backend_url` is not an
/// `http(s)` URL.
pub fn realtime_url(backend_url: &str, api_key: &str) -> Result<String, GatewayError> {
    let mut url = Url::parse(backend_url)
        .map_err(|e| GatewayError::Configuration(format!("invalid backend url: {e}")))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(GatewayError::Configuration(format!(
                "unsupported backend scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| GatewayError::Configuration("cannot derive realtime scheme".to_string()))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");
    Ok(url.into())
}

/// PostgREST `in` filter value: `in.(a,b,c)`.
#[must_use]
pub fn in_filter(ids: &[&str]) -> String {
    format!("in.({})", ids.join(","))
}

/// Maps a failed response to the client-visible error class.
///
/// 401/403 mean the row policy or the token rejected us. A body carrying the
/// `misconfigured` code means the privileged API has no elevated credential.
#[must_use]
pub fn error_from_response(status: StatusCode, body: &str) -> GatewayError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().map_or_else(
        || format!("{status}: {body}"),
        |b| match &b.details {
            Some(details) => format!("{}: {details}", b.error),
            None => b.error.clone(),
        },
    );

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return GatewayError::Authorization(message);
    }
    if parsed.and_then(|b| b.code) == Some(ApiErrorCode::Misconfigured) {
        return GatewayError::Configuration(message);
    }
    GatewayError::DataAccess(message)
}

async fn check(resp: Response) -> Result<Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().path().to_string();
    let body = resp.text().await.unwrap_or_default();
    let err = error_from_response(status, &body);
    if err.is_configuration() {
        tracing::error!(%status, path = %url, err = %err, "privileged endpoint misconfigured");
    } else {
        tracing::warn!(%status, path = %url, err = %err, "backend request failed");
    }
    Err(err)
}

async fn read_json(resp: Response) -> Result<Value, GatewayError> {
    resp.json()
        .await
        .map_err(|e| GatewayError::DataAccess(format!("invalid response body: {e}")))
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    tracing::warn!(err = %e, "backend unreachable");
    GatewayError::DataAccess(format!("backend unreachable: {e}"))
}
