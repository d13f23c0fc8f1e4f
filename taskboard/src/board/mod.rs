//! The task board: store, bulk actions and realtime reconciler bound to one
//! gateway and one session.
//!
//! Every operation finishes its gateway call first and then applies the
//! confirmed result to the [`TaskStore`] in one locked step. The store lock
//! is a `parking_lot` mutex, whose guard is not `Send`, so a store mutation
//! can never straddle an `.await`.

pub mod controller;
pub mod reconciler;
pub mod selection;
pub mod store;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use taskboard_proto::{List, Task, TaskId, TaskPatch};

use crate::dashboard::CompletionTrend;
use crate::forms::{NewListForm, NewTaskForm, TaskEditForm, ValidationError};
use crate::gateway::{Gateway, GatewayError};
use crate::session::Session;

use self::controller::BulkActions;
use self::reconciler::{Reconciler, ReconcilerState};
use self::store::{BoardSnapshot, TaskStore, ViewMode};

/// Errors from board operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The gateway call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The input was rejected before reaching the gateway.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The board was torn down while the call was in flight; the response
    /// was discarded.
    #[error("board was torn down before the response arrived")]
    Detached,
}

/// Shared flag cleared on teardown.
///
/// Every post-suspension mutation checks it so late responses never touch
/// a store nobody is looking at.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Default for Liveness {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl Liveness {
    /// Whether the board is still mounted.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Marks the board torn down.
    pub fn detach(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// `Err(Detached)` once torn down.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Detached`] after [`Liveness::detach`].
    pub fn ensure(&self) -> Result<(), BoardError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(BoardError::Detached)
        }
    }
}

/// Logs a gateway failure at the level its class deserves.
pub(crate) fn log_gateway_error(op: &'static str, err: &GatewayError) {
    if err.is_configuration() {
        tracing::error!(op, err = %err, "privileged operation misconfigured");
    } else {
        tracing::warn!(op, err = %err, "gateway call failed");
    }
}

/// Fetches metadata for bucket keys without a list and merges it.
///
/// Returns the number of lists added. A failure is recorded on the store
/// and returned, but leaves the store otherwise untouched.
pub(crate) async fn reconcile_missing<G: Gateway>(
    gateway: &G,
    store: &Mutex<TaskStore>,
    live: &Liveness,
) -> Result<usize, BoardError> {
    let missing = store.lock().missing_list_ids();
    if missing.is_empty() {
        return Ok(0);
    }

    let fetched = gateway.get_lists_by_ids(&missing).await;
    live.ensure()?;
    match fetched {
        Ok(lists) => {
            let added = store.lock().merge_lists(lists);
            tracing::debug!(missing = missing.len(), added, "merged missing list metadata");
            Ok(added)
        }
        Err(e) => {
            log_gateway_error("get_lists_by_ids", &e);
            store.lock().set_error(e.to_string());
            Err(e.into())
        }
    }
}

/// One user's mounted task board.
pub struct Board<G> {
    gateway: Arc<G>,
    store: Arc<Mutex<TaskStore>>,
    session: Session,
    live: Liveness,
    reconciler: tokio::sync::Mutex<Reconciler<G>>,
}

impl<G: Gateway + 'static> Board<G> {
    /// Mounts a board for `session`. Nothing is fetched until
    /// [`Board::load_initial`].
    pub fn new(gateway: Arc<G>, session: Session, mode: ViewMode, queue_capacity: usize) -> Self {
        let store = Arc::new(Mutex::new(TaskStore::new(session.user_id.clone(), mode)));
        let live = Liveness::default();
        let reconciler = Reconciler::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            live.clone(),
            queue_capacity,
        );
        Self {
            gateway,
            store,
            session,
            live,
            reconciler: tokio::sync::Mutex::new(reconciler),
        }
    }

    /// Session the board was mounted for.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Shared store handle.
    #[must_use]
    pub fn store(&self) -> Arc<Mutex<TaskStore>> {
        Arc::clone(&self.store)
    }

    /// Liveness flag shared with the controller and the reconciler.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.live.clone()
    }

    /// Selection and bulk actions over this board's store.
    #[must_use]
    pub fn bulk(&self) -> BulkActions<G> {
        BulkActions::new(Arc::clone(&self.gateway), Arc::clone(&self.store), self.live.clone())
    }

    /// Fetches lists and the tasks of the view mode and replaces the store.
    ///
    /// Either both fetches succeed and the store is replaced in one step, or
    /// the store keeps its previous contents and the error is recorded.
    /// Missing list metadata is reconciled afterwards; that step's failure
    /// is recorded but does not fail the load.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Gateway`] if a fetch fails and
    /// [`BoardError::Detached`] if the board was torn down meanwhile.
    pub async fn load_initial(&self) -> Result<(), BoardError> {
        let owner = &self.session.user_id;
        let mode = self.store.lock().mode();

        let fetched = match self.gateway.list_lists(owner).await {
            Ok(lists) => {
                let tasks = match mode {
                    ViewMode::Open => self.gateway.list_incomplete_tasks(owner).await,
                    ViewMode::Completed => self.gateway.list_completed_tasks(owner).await,
                };
                tasks.map(|tasks| (lists, tasks))
            }
            Err(e) => Err(e),
        };
        self.live.ensure()?;

        match fetched {
            Ok((lists, tasks)) => {
                tracing::info!(
                    user_id = %owner,
                    lists = lists.len(),
                    tasks = tasks.len(),
                    ?mode,
                    "initial load complete"
                );
                self.store.lock().replace(lists, tasks);
            }
            Err(e) => {
                log_gateway_error("load_initial", &e);
                self.store.lock().set_error(e.to_string());
                return Err(e.into());
            }
        }

        match reconcile_missing(&*self.gateway, &self.store, &self.live).await {
            Ok(_) => Ok(()),
            Err(BoardError::Detached) => Err(BoardError::Detached),
            Err(e) => {
                tracing::debug!(err = %e, "list metadata reconcile after load failed");
                Ok(())
            }
        }
    }

    /// Fills in list metadata for buckets whose list is unknown.
    ///
    /// # Errors
    ///
    /// Returns the gateway failure; the store is left as it was.
    pub async fn reconcile_missing_list_metadata(&self) -> Result<usize, BoardError> {
        reconcile_missing(&*self.gateway, &self.store, &self.live).await
    }

    /// Creates a list and shows it once the gateway confirms.
    ///
    /// # Errors
    ///
    /// Validation, gateway or detach errors.
    pub async fn create_list(&self, form: &NewListForm) -> Result<List, BoardError> {
        let new = form.validate(Some(&self.session.user_id))?;
        let created = self.gateway.create_list(&new).await;
        let list = self.confirm("create_list", created)?;
        self.store.lock().apply_list_inserted(list.clone());
        tracing::info!(list_id = %list.id, "list created");
        Ok(list)
    }

    /// Creates a task and shows it once the gateway confirms.
    ///
    /// # Errors
    ///
    /// Validation, gateway or detach errors.
    pub async fn create_task(&self, form: &NewTaskForm) -> Result<Task, BoardError> {
        let new = form.validate(Some(&self.session.user_id))?;
        let created = self.gateway.create_task(&new).await;
        let task = self.confirm("create_task", created)?;
        self.store.lock().apply_task_inserted(task.clone());
        tracing::info!(task_id = %task.id, "task created");
        Ok(task)
    }

    /// Saves an edited task.
    ///
    /// # Errors
    ///
    /// Validation, gateway or detach errors.
    pub async fn edit_task(&self, id: &TaskId, form: &TaskEditForm) -> Result<Task, BoardError> {
        let patch = form.validate()?;
        self.update_task(id, &patch, "edit_task").await
    }

    /// Fetches one task by id, whichever view it belongs to.
    ///
    /// The store is not touched. Another user's task reads as `None`.
    ///
    /// # Errors
    ///
    /// Gateway or detach errors.
    pub async fn fetch_task(&self, id: &TaskId) -> Result<Option<Task>, BoardError> {
        let fetched = self.gateway.get_task(id).await;
        let task = self.confirm("get_task", fetched)?;
        Ok(task.filter(|t| t.user_id == self.session.user_id))
    }

    /// Marks a single task completed.
    ///
    /// # Errors
    ///
    /// Gateway or detach errors.
    pub async fn complete_task(&self, id: &TaskId) -> Result<Task, BoardError> {
        self.update_task(id, &TaskPatch::complete(Utc::now()), "complete_task")
            .await
    }

    async fn update_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
        op: &'static str,
    ) -> Result<Task, BoardError> {
        let updated = self.gateway.update_task(id, patch).await;
        let task = self.confirm(op, updated)?;
        self.store.lock().apply_task_updated(task.clone());
        Ok(task)
    }

    /// Checks liveness and records failures on the store.
    fn confirm<T>(&self, op: &'static str, result: Result<T, GatewayError>) -> Result<T, BoardError> {
        self.live.ensure()?;
        result.map_err(|e| {
            log_gateway_error(op, &e);
            self.store.lock().set_error(e.to_string());
            e.into()
        })
    }

    /// Starts realtime reconciliation. No-op if already running.
    ///
    /// # Errors
    ///
    /// Returns the subscribe failure; the reconciler stays unsubscribed.
    pub async fn start_realtime(&self) -> Result<(), BoardError> {
        self.live.ensure()?;
        self.reconciler.lock().await.start().await
    }

    /// Stops realtime reconciliation.
    pub async fn stop_realtime(&self) {
        self.reconciler.lock().await.stop().await;
    }

    /// Current reconciler state.
    pub async fn realtime_state(&self) -> ReconcilerState {
        self.reconciler.lock().await.state()
    }

    /// Unmounts the board: late responses are discarded from now on and the
    /// realtime subscriptions are closed.
    pub async fn teardown(&self) {
        self.live.detach();
        self.stop_realtime().await;
        tracing::info!(user_id = %self.session.user_id, "board torn down");
    }

    /// Owned copy of the store for rendering.
    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        self.store.lock().snapshot()
    }

    /// Completion statistics over all of the user's tasks.
    ///
    /// # Errors
    ///
    /// Gateway or detach errors.
    pub async fn dashboard(&self, now: DateTime<Utc>, days: u32) -> Result<CompletionTrend, BoardError> {
        let tasks = self.gateway.list_tasks(&self.session.user_id).await;
        let tasks = self.confirm("dashboard", tasks)?;
        Ok(CompletionTrend::compute(&tasks, now, days))
    }
}
