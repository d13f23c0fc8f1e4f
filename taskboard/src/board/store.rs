//! Client-side cache of one user's lists and grouped tasks.
//!
//! `TaskStore` is plain synchronous state. Every mutation is a single call
//! that leaves the grouped view consistent, so callers holding the lock for
//! one call can never expose a half-applied change. Gateway calls happen
//! outside; the store only ever sees confirmed entities.

use std::collections::{BTreeMap, HashSet};

use taskboard_proto::{BucketKey, ChangeEvent, List, ListId, Task, TaskId, UserId};

use super::selection::SelectionSet;

/// Which tasks the grouped view holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    /// Incomplete tasks only.
    #[default]
    Open,
    /// Completed tasks only.
    Completed,
}

impl ViewMode {
    /// Whether a task with this completion state belongs in the view.
    #[must_use]
    pub const fn admits(self, task: &Task) -> bool {
        match self {
            Self::Open => !task.completed,
            Self::Completed => task.completed,
        }
    }
}

/// One bucket ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketView {
    /// Bucket key.
    pub key: BucketKey,
    /// List name, when the list metadata is known.
    pub name: Option<String>,
    /// Tasks in creation order.
    pub tasks: Vec<Task>,
}

/// Owned copy of the store for views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    /// View mode the snapshot was taken in.
    pub mode: ViewMode,
    /// Known lists, newest first.
    pub lists: Vec<List>,
    /// Buckets in display order: known lists first, then buckets whose list
    /// metadata is still missing, then the unlisted bucket.
    pub buckets: Vec<BucketView>,
    /// Selected task ids.
    pub selected: Vec<TaskId>,
    /// Last error message, if any.
    pub last_error: Option<String>,
}

/// Lists, grouped tasks, selection and the last surfaced error.
///
/// # Invariants
///
/// - every task appears in exactly one bucket, the one named by its `list_id`;
/// - each bucket is ordered by `created_at` ascending;
/// - every task admitted by the view mode belongs to the session user;
/// - every selected id is present in some bucket.
#[derive(Debug, Clone)]
pub struct TaskStore {
    user_id: UserId,
    mode: ViewMode,
    lists: Vec<List>,
    buckets: BTreeMap<BucketKey, Vec<Task>>,
    selection: SelectionSet,
    last_error: Option<String>,
}

impl TaskStore {
    /// Creates an empty store for `user_id`.
    #[must_use]
    pub fn new(user_id: UserId, mode: ViewMode) -> Self {
        Self {
            user_id,
            mode,
            lists: Vec::new(),
            buckets: BTreeMap::new(),
            selection: SelectionSet::new(),
            last_error: None,
        }
    }

    /// Session user.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// View mode.
    #[must_use]
    pub const fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Replaces all lists and tasks at once.
    ///
    /// Tasks are grouped by `list_id`; tasks the view mode does not admit or
    /// owned by someone else are skipped, as are repeated ids and other
    /// users' lists. Every kept list gets a bucket, empty or not. The
    /// selection keeps only ids still present and the last error is cleared.
    pub fn replace(&mut self, lists: Vec<List>, tasks: Vec<Task>) {
        let mut buckets: BTreeMap<BucketKey, Vec<Task>> = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut skipped = 0_usize;
        for task in tasks {
            if task.user_id != self.user_id
                || !self.mode.admits(&task)
                || !seen.insert(task.id.clone())
            {
                skipped += 1;
                continue;
            }
            buckets.entry(task.bucket_key()).or_default().push(task);
        }
        for bucket in buckets.values_mut() {
            bucket.sort_by_key(|t| t.created_at);
        }
        if skipped > 0 {
            tracing::debug!(skipped, "initial load skipped tasks outside the view");
        }

        let mut list_ids = HashSet::new();
        self.lists = lists
            .into_iter()
            .filter(|l| l.user_id == self.user_id && list_ids.insert(l.id.clone()))
            .collect();
        for list in &self.lists {
            buckets.entry(BucketKey::List(list.id.clone())).or_default();
        }
        self.buckets = buckets;
        let buckets = &self.buckets;
        self.selection
            .retain(|id| buckets.values().any(|b| b.iter().any(|t| &t.id == id)));
        self.last_error = None;
    }

    /// Applies one realtime event. Returns `true` if the view changed.
    pub fn apply(&mut self, event: ChangeEvent) -> bool {
        match event {
            ChangeEvent::ListInserted(list) => self.apply_list_inserted(list),
            ChangeEvent::TaskInserted(task) => self.apply_task_inserted(task),
            ChangeEvent::TaskUpdated(task) => self.apply_task_updated(task),
        }
    }

    /// Prepends a newly created list and gives it a bucket.
    ///
    /// Idempotent. An existing bucket for the id (tasks that arrived before
    /// the list did) is kept as is.
    pub fn apply_list_inserted(&mut self, list: List) -> bool {
        if list.user_id != self.user_id {
            tracing::trace!(list_id = %list.id, "ignoring list of another user");
            return false;
        }
        if self.lists.iter().any(|l| l.id == list.id) {
            return false;
        }
        self.buckets
            .entry(BucketKey::List(list.id.clone()))
            .or_default();
        self.lists.insert(0, list);
        true
    }

    /// Inserts a task into its bucket at its creation-order position.
    ///
    /// Ignored if it belongs to another user, if the view mode does not admit
    /// it, or if a task with the same id is already in any bucket.
    pub fn apply_task_inserted(&mut self, task: Task) -> bool {
        if task.user_id != self.user_id {
            tracing::trace!(task_id = %task.id, "ignoring task of another user");
            return false;
        }
        if !self.mode.admits(&task) || self.contains_task(&task.id) {
            return false;
        }
        self.insert_sorted(task);
        true
    }

    /// Applies the full new row of an updated task.
    ///
    /// A task the view no longer admits leaves every bucket. A present task
    /// is replaced and moved to the bucket of its current `list_id`. An
    /// absent task is inserted only when the update is what brings it into
    /// the view in [`ViewMode::Completed`]; an incomplete task absent from
    /// the open view stays absent until the next full load.
    pub fn apply_task_updated(&mut self, task: Task) -> bool {
        if task.user_id != self.user_id {
            tracing::trace!(task_id = %task.id, "ignoring update of another user's task");
            return false;
        }
        if !self.mode.admits(&task) {
            return self.remove_tasks(std::slice::from_ref(&task.id)) > 0;
        }

        let present = self.take_task(&task.id);
        if present || self.mode == ViewMode::Completed {
            self.insert_sorted(task);
            true
        } else {
            tracing::debug!(task_id = %task.id, "update for task outside the view ignored");
            false
        }
    }

    /// Removes every task whose id is in `ids`, from every bucket.
    ///
    /// Idempotent; purges the ids from the selection. A bucket left empty
    /// whose list is unknown is dropped. Returns how many tasks were removed.
    pub fn remove_tasks(&mut self, ids: &[TaskId]) -> usize {
        let mut removed = 0;
        for bucket in self.buckets.values_mut() {
            let before = bucket.len();
            bucket.retain(|t| !ids.contains(&t.id));
            removed += before - bucket.len();
        }
        for id in ids {
            self.selection.remove(id);
        }
        if removed > 0 {
            self.drop_orphan_buckets();
        }
        removed
    }

    /// List ids that key a non-empty bucket but have no list metadata.
    #[must_use]
    pub fn missing_list_ids(&self) -> Vec<ListId> {
        self.buckets
            .iter()
            .filter(|(_, tasks)| !tasks.is_empty())
            .filter_map(|(key, _)| key.list_id())
            .filter(|id| !self.lists.iter().any(|l| &l.id == *id))
            .cloned()
            .collect()
    }

    /// Appends fetched list metadata, skipping lists already known, and
    /// gives each added list a bucket. Returns how many lists were added.
    pub fn merge_lists(&mut self, fetched: Vec<List>) -> usize {
        let mut added = 0;
        for list in fetched {
            if list.user_id != self.user_id || self.lists.iter().any(|l| l.id == list.id) {
                continue;
            }
            self.buckets
                .entry(BucketKey::List(list.id.clone()))
                .or_default();
            self.lists.push(list);
            added += 1;
        }
        added
    }

    /// Adds `id` to the selection if it is in the view. Selecting twice is
    /// the same as selecting once. Returns `true` if `id` is selected.
    pub fn select(&mut self, id: &TaskId) -> bool {
        if self.selection.contains(id) {
            return true;
        }
        if !self.contains_task(id) {
            tracing::debug!(task_id = %id, "cannot select a task outside the view");
            return false;
        }
        self.selection.insert(id);
        true
    }

    /// Toggles `id` in the selection.
    ///
    /// Only ids present in the view can be selected; an absent id can only
    /// be deselected. Returns `true` if `id` is selected afterwards.
    pub fn toggle_selection(&mut self, id: &TaskId) -> bool {
        if self.selection.contains(id) || self.contains_task(id) {
            self.selection.toggle(id)
        } else {
            tracing::debug!(task_id = %id, "cannot select a task outside the view");
            false
        }
    }

    /// Current selection.
    #[must_use]
    pub const fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// Empties the selection.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Known lists, newest first.
    #[must_use]
    pub fn lists(&self) -> &[List] {
        &self.lists
    }

    /// Tasks in one bucket, or `None` if the bucket does not exist.
    #[must_use]
    pub fn bucket(&self, key: &BucketKey) -> Option<&[Task]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// All buckets, including empty ones.
    pub fn buckets(&self) -> impl Iterator<Item = (&BucketKey, &[Task])> {
        self.buckets.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Whether a task with `id` is in any bucket.
    #[must_use]
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task(id).is_some()
    }

    /// Looks a task up by id.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.buckets.values().flatten().find(|t| &t.id == id)
    }

    /// Number of tasks across all buckets.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Last error message surfaced to the user.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Records an error for display.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Clears the displayed error.
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Copies the store for rendering.
    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        let mut buckets = Vec::with_capacity(self.buckets.len());
        for list in &self.lists {
            if let Some(tasks) = self.buckets.get(&BucketKey::List(list.id.clone())) {
                buckets.push(BucketView {
                    key: BucketKey::List(list.id.clone()),
                    name: Some(list.name.clone()),
                    tasks: tasks.clone(),
                });
            }
        }
        for (key, tasks) in &self.buckets {
            let known = match key {
                BucketKey::List(id) => self.lists.iter().any(|l| &l.id == id),
                BucketKey::Unlisted => true,
            };
            if !known {
                buckets.push(BucketView {
                    key: key.clone(),
                    name: None,
                    tasks: tasks.clone(),
                });
            }
        }
        if let Some(tasks) = self.buckets.get(&BucketKey::Unlisted) {
            buckets.push(BucketView {
                key: BucketKey::Unlisted,
                name: None,
                tasks: tasks.clone(),
            });
        }

        BoardSnapshot {
            mode: self.mode,
            lists: self.lists.clone(),
            buckets,
            selected: self.selection.to_vec(),
            last_error: self.last_error.clone(),
        }
    }

    /// Removes `id` from whichever bucket holds it, keeping the selection.
    fn take_task(&mut self, id: &TaskId) -> bool {
        let mut found = false;
        for bucket in self.buckets.values_mut() {
            let before = bucket.len();
            bucket.retain(|t| &t.id != id);
            found |= bucket.len() != before;
        }
        if found {
            self.drop_orphan_buckets();
        }
        found
    }

    /// Drops empty buckets keyed by a list without metadata.
    fn drop_orphan_buckets(&mut self) {
        let lists = &self.lists;
        self.buckets.retain(|key, tasks| match key {
            BucketKey::List(id) => !tasks.is_empty() || lists.iter().any(|l| &l.id == id),
            BucketKey::Unlisted => true,
        });
    }

    fn insert_sorted(&mut self, task: Task) {
        let bucket = self.buckets.entry(task.bucket_key()).or_default();
        let at = bucket.partition_point(|t| t.created_at <= task.created_at);
        bucket.insert(at, task);
    }
}
