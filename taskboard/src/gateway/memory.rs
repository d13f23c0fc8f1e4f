//! In-process gateway for tests and offline demo mode.
//!
//! Keeps `lists`, `tasks` and `profiles` tables in memory and pushes change
//! events into subscriber queues the way the realtime feed would. Failures,
//! a missing privileged credential and slow responses can be injected.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use taskboard_proto::{
    ChangeEvent, List, ListId, NewList, NewTask, Table, Task, TaskId, TaskPatch, UserId,
};

use super::{Gateway, GatewayError, SubscriptionHandle};

/// Gateway operations that can be made to fail with [`InMemoryGateway::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_lists`
    ListLists,
    /// `list_incomplete_tasks`, `list_completed_tasks` and `list_tasks`
    ListTasks,
    /// `get_task`
    GetTask,
    /// `get_lists_by_ids`
    GetListsByIds,
    /// `bulk_complete_tasks`
    BulkComplete,
    /// `delete_tasks`
    DeleteTasks,
    /// `create_list`
    CreateList,
    /// `create_task`
    CreateTask,
    /// `update_task`
    UpdateTask,
    /// `subscribe_changes`
    Subscribe,
    /// `upsert_profile`
    UpsertProfile,
}

#[derive(Debug, Default)]
struct Tables {
    lists: Vec<List>,
    tasks: Vec<Task>,
    profiles: HashMap<UserId, Option<String>>,
}

struct Subscriber {
    handle: SubscriptionHandle,
    events: mpsc::Sender<ChangeEvent>,
}

/// Backend stand-in holding its tables in memory.
pub struct InMemoryGateway {
    tables: Mutex<Tables>,
    subscribers: Mutex<Vec<Subscriber>>,
    failures: Mutex<HashMap<Operation, GatewayError>>,
    hold: Mutex<Option<Arc<Notify>>>,
    privileged_configured: AtomicBool,
    next_handle: AtomicU64,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    /// Creates an empty gateway with the privileged credential configured.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            subscribers: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            hold: Mutex::new(None),
            privileged_configured: AtomicBool::new(true),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Inserts a list without emitting a change event.
    pub fn seed_list(&self, list: List) {
        self.tables.lock().lists.push(list);
    }

    /// Inserts a task without emitting a change event.
    pub fn seed_task(&self, task: Task) {
        self.tables.lock().tasks.push(task);
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: Operation, error: GatewayError) {
        self.failures.lock().insert(op, error);
    }

    /// Simulates a privileged API with or without its service credential.
    pub fn set_privileged_configured(&self, configured: bool) {
        self.privileged_configured.store(configured, Ordering::Relaxed);
    }

    /// Holds every subsequent response until the returned [`Notify`] is
    /// signalled, once per held call.
    pub fn hold_responses(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock() = Some(Arc::clone(&notify));
        notify
    }

    /// Stops holding responses.
    pub fn release_responses(&self) {
        if let Some(notify) = self.hold.lock().take() {
            notify.notify_waiters();
        }
    }

    /// Pushes an event to matching subscribers without touching the tables.
    ///
    /// Stands in for changes made by other sessions, including other users'
    /// rows on a shared feed.
    pub async fn publish(&self, event: ChangeEvent) {
        let table = event.table();
        let targets: Vec<_> = self
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.handle.table() == table)
            .map(|s| s.events.clone())
            .collect();

        for events in targets {
            if events.send(event.clone()).await.is_err() {
                tracing::debug!(%table, "subscriber queue closed, dropping event");
            }
        }
    }

    /// Current contents of the `tasks` table.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.tables.lock().tasks.clone()
    }

    /// Email stored for a profile, if the profile exists.
    #[must_use]
    pub fn profile(&self, id: &UserId) -> Option<Option<String>> {
        self.tables.lock().profiles.get(id).cloned()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Waits on the response hold, then returns any injected failure for `op`.
    async fn checkpoint(&self, op: Operation) -> Result<(), GatewayError> {
        let hold = self.hold.lock().clone();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        match self.failures.lock().remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn require_privileged(&self) -> Result<(), GatewayError> {
        if self.privileged_configured.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(GatewayError::Configuration(
                "missing service role key".to_string(),
            ))
        }
    }

    fn tasks_where(&self, owner: &UserId, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tables
            .lock()
            .tasks
            .iter()
            .filter(|t| &t.user_id == owner && keep(t))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }
}

impl Gateway for InMemoryGateway {
    async fn list_lists(&self, owner: &UserId) -> Result<Vec<List>, GatewayError> {
        self.checkpoint(Operation::ListLists).await?;
        let mut lists: Vec<List> = self
            .tables
            .lock()
            .lists
            .iter()
            .filter(|l| &l.user_id == owner)
            .cloned()
            .collect();
        lists.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lists)
    }

    async fn list_incomplete_tasks(&self, owner: &UserId) -> Result<Vec<Task>, GatewayError> {
        self.checkpoint(Operation::ListTasks).await?;
        Ok(self.tasks_where(owner, |t| !t.completed))
    }

    async fn list_completed_tasks(&self, owner: &UserId) -> Result<Vec<Task>, GatewayError> {
        self.checkpoint(Operation::ListTasks).await?;
        Ok(self.tasks_where(owner, |t| t.completed))
    }

    async fn list_tasks(&self, owner: &UserId) -> Result<Vec<Task>, GatewayError> {
        self.checkpoint(Operation::ListTasks).await?;
        Ok(self.tasks_where(owner, |_| true))
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, GatewayError> {
        self.checkpoint(Operation::GetTask).await?;
        Ok(self.tables.lock().tasks.iter().find(|t| &t.id == id).cloned())
    }

    async fn get_lists_by_ids(&self, ids: &[ListId]) -> Result<Vec<List>, GatewayError> {
        self.checkpoint(Operation::GetListsByIds).await?;
        Ok(self
            .tables
            .lock()
            .lists
            .iter()
            .filter(|l| ids.contains(&l.id))
            .cloned()
            .collect())
    }

    async fn bulk_complete_tasks(&self, ids: &[TaskId]) -> Result<Vec<TaskId>, GatewayError> {
        self.checkpoint(Operation::BulkComplete).await?;
        self.require_privileged()?;

        let now = Utc::now();
        let updated: Vec<Task> = {
            let mut tables = self.tables.lock();
            tables
                .tasks
                .iter_mut()
                .filter(|t| ids.contains(&t.id))
                .map(|t| {
                    t.completed = true;
                    t.completed_at = Some(now);
                    t.clone()
                })
                .collect()
        };

        let updated_ids = updated.iter().map(|t| t.id.clone()).collect();
        for task in updated {
            self.publish(ChangeEvent::TaskUpdated(task)).await;
        }
        Ok(updated_ids)
    }

    async fn delete_tasks(&self, ids: &[TaskId]) -> Result<(), GatewayError> {
        self.checkpoint(Operation::DeleteTasks).await?;
        self.tables.lock().tasks.retain(|t| !ids.contains(&t.id));
        Ok(())
    }

    async fn create_list(&self, new: &NewList) -> Result<List, GatewayError> {
        self.checkpoint(Operation::CreateList).await?;
        let list = List {
            id: ListId::new(Uuid::now_v7().to_string()),
            name: new.name.clone(),
            user_id: new.user_id.clone(),
            created_at: Utc::now(),
        };
        self.tables.lock().lists.push(list.clone());
        self.publish(ChangeEvent::ListInserted(list.clone())).await;
        Ok(list)
    }

    async fn create_task(&self, new: &NewTask) -> Result<Task, GatewayError> {
        self.checkpoint(Operation::CreateTask).await?;
        let task = Task {
            id: TaskId::new(Uuid::now_v7().to_string()),
            name: new.name.clone(),
            description: new.description.clone(),
            user_id: new.user_id.clone(),
            list_id: new.list_id.clone(),
            completed: false,
            due_date: new.due_date,
            completed_at: None,
            created_at: Utc::now(),
        };
        self.tables.lock().tasks.push(task.clone());
        self.publish(ChangeEvent::TaskInserted(task.clone())).await;
        Ok(task)
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, GatewayError> {
        self.checkpoint(Operation::UpdateTask).await?;
        let updated = {
            let mut tables = self.tables.lock();
            let task = tables
                .tasks
                .iter_mut()
                .find(|t| &t.id == id)
                .ok_or_else(|| GatewayError::DataAccess(format!("task not found: {id}")))?;
            patch.apply_to(task);
            task.clone()
        };
        self.publish(ChangeEvent::TaskUpdated(updated.clone())).await;
        Ok(updated)
    }

    async fn subscribe_changes(
        &self,
        table: Table,
        events: mpsc::Sender<ChangeEvent>,
    ) -> Result<SubscriptionHandle, GatewayError> {
        self.checkpoint(Operation::Subscribe).await?;
        let handle = SubscriptionHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed), table);
        self.subscribers.lock().push(Subscriber {
            handle: handle.clone(),
            events,
        });
        tracing::debug!(%handle, "in-memory subscription started");
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers.lock().retain(|s| s.handle != handle);
        tracing::debug!(%handle, "in-memory subscription stopped");
    }

    async fn upsert_profile(&self, id: &UserId, email: Option<&str>) -> Result<(), GatewayError> {
        self.checkpoint(Operation::UpsertProfile).await?;
        self.require_privileged()?;
        self.tables
            .lock()
            .profiles
            .insert(id.clone(), email.map(String::from));
        Ok(())
    }
}
