//! Data access gateway abstraction for Taskboard.
//!
//! Defines the [`Gateway`] trait through which the task board reads and
//! writes lists and tasks and receives change notifications.
//! Implementations:
//! - [`memory::InMemoryGateway`]: in-process tables for tests and demo mode
//! - [`rest::RestGateway`]: PostgREST-style REST plus the realtime feed

pub mod memory;
pub mod realtime;
pub mod rest;

use std::fmt;

use tokio::sync::mpsc;

use taskboard_proto::row::RowError;
use taskboard_proto::{ChangeEvent, List, ListId, NewList, NewTask, Table, Task, TaskId, TaskPatch, UserId};

/// Errors that can occur during gateway operations.
///
/// The variants are the client-visible failure classes: views redirect to
/// sign-in on [`Authorization`](Self::Authorization) and show an operator
/// message on [`Configuration`](Self::Configuration).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Network or backend failure, including malformed backend rows.
    #[error("data access failed: {0}")]
    DataAccess(String),

    /// The backend's row-level policy rejected the caller.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// A privileged endpoint lacks its server-side credential.
    #[error("server misconfigured: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Returns `true` for failures an operator has to fix, not the user.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<RowError> for GatewayError {
    fn from(e: RowError) -> Self {
        Self::DataAccess(e.to_string())
    }
}

/// Handle for one live change subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    table: Table,
}

impl SubscriptionHandle {
    /// Creates a handle; gateways pick unique ids.
    #[must_use]
    pub const fn new(id: u64, table: Table) -> Self {
        Self { id, table }
    }

    /// Gateway-local subscription id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Table the subscription watches.
    #[must_use]
    pub const fn table(&self) -> Table {
        self.table
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table, self.id)
    }
}

/// Async capability set the task board needs from the backend.
///
/// Every call is fallible and may suspend. Implementations return typed
/// entities only; untyped rows are converted before they leave the gateway.
///
/// # Invariant
///
/// Change events for one subscription are pushed into its queue in the
/// order the backend delivered them.
pub trait Gateway: Send + Sync {
    /// All lists owned by `owner`, newest first.
    fn list_lists(
        &self,
        owner: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<List>, GatewayError>> + Send;

    /// All incomplete tasks owned by `owner`, oldest first.
    fn list_incomplete_tasks(
        &self,
        owner: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, GatewayError>> + Send;

    /// All completed tasks owned by `owner`, oldest first.
    fn list_completed_tasks(
        &self,
        owner: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, GatewayError>> + Send;

    /// Every task owned by `owner`, oldest first.
    fn list_tasks(
        &self,
        owner: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, GatewayError>> + Send;

    /// One task by id, or `None` if it does not exist or is not visible.
    fn get_task(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<Option<Task>, GatewayError>> + Send;

    /// Lists with the given ids; unknown ids are skipped.
    fn get_lists_by_ids(
        &self,
        ids: &[ListId],
    ) -> impl std::future::Future<Output = Result<Vec<List>, GatewayError>> + Send;

    /// Marks tasks completed through the privileged endpoint.
    ///
    /// Returns the ids actually updated, which may be a strict subset of
    /// `ids`. Fails with [`GatewayError::Configuration`] when the endpoint
    /// has no elevated credential.
    fn bulk_complete_tasks(
        &self,
        ids: &[TaskId],
    ) -> impl std::future::Future<Output = Result<Vec<TaskId>, GatewayError>> + Send;

    /// Deletes tasks. All-or-nothing.
    fn delete_tasks(
        &self,
        ids: &[TaskId],
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;

    /// Creates a list and returns it as stored.
    fn create_list(
        &self,
        list: &NewList,
    ) -> impl std::future::Future<Output = Result<List, GatewayError>> + Send;

    /// Creates a task and returns it as stored.
    fn create_task(
        &self,
        task: &NewTask,
    ) -> impl std::future::Future<Output = Result<Task, GatewayError>> + Send;

    /// Applies a partial update and returns the task as stored.
    fn update_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<Task, GatewayError>> + Send;

    /// Starts pushing insert/update events for `table` into `events`.
    fn subscribe_changes(
        &self,
        table: Table,
        events: mpsc::Sender<ChangeEvent>,
    ) -> impl std::future::Future<Output = Result<SubscriptionHandle, GatewayError>> + Send;

    /// Stops a subscription. Unknown handles are ignored.
    fn unsubscribe(
        &self,
        handle: SubscriptionHandle,
    ) -> impl std::future::Future<Output = ()> + Send;

    /// Creates or refreshes the user's profile through the privileged endpoint.
    fn upsert_profile(
        &self,
        id: &UserId,
        email: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;
}
