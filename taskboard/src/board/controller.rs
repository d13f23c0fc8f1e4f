//! Selection and bulk actions.
//!
//! Bulk completion removes exactly the ids the gateway reports as updated,
//! never the requested set. Deletion is two-phase: [`BulkActions::request_delete`]
//! hands out a [`PendingDelete`] token and only [`BulkActions::confirm_delete`]
//! with that token reaches the gateway.

use std::sync::Arc;

use parking_lot::Mutex;

use taskboard_proto::TaskId;

use super::store::TaskStore;
use super::{BoardError, Liveness, log_gateway_error};
use crate::gateway::Gateway;

/// A delete the user has requested but not yet confirmed.
///
/// Only [`BulkActions::request_delete`] creates one. Dropping it cancels.
#[derive(Debug)]
#[must_use = "a pending delete does nothing until confirmed"]
pub struct PendingDelete {
    ids: Vec<TaskId>,
}

impl PendingDelete {
    /// Tasks that will be deleted on confirmation.
    #[must_use]
    pub fn ids(&self) -> &[TaskId] {
        &self.ids
    }

    /// Number of tasks to delete.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always `false`; empty selections produce no token.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Selection and bulk operations over a shared store.
pub struct BulkActions<G> {
    gateway: Arc<G>,
    store: Arc<Mutex<TaskStore>>,
    live: Liveness,
}

impl<G> Clone for BulkActions<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            store: Arc::clone(&self.store),
            live: self.live.clone(),
        }
    }
}

impl<G: Gateway> BulkActions<G> {
    /// Binds the controller to a gateway and a store.
    pub const fn new(gateway: Arc<G>, store: Arc<Mutex<TaskStore>>, live: Liveness) -> Self {
        Self {
            gateway,
            store,
            live,
        }
    }

    /// Toggles a task in the selection. Returns `true` if it is selected
    /// afterwards. Ids outside the view can only be deselected.
    pub fn toggle_selection(&self, id: &TaskId) -> bool {
        self.store.lock().toggle_selection(id)
    }

    /// Adds a task to the selection; repeated calls keep it selected.
    /// Returns `false` for ids outside the view.
    pub fn select(&self, id: &TaskId) -> bool {
        self.store.lock().select(id)
    }

    /// Completes every selected task in one gateway call.
    ///
    /// Returns the number of tasks removed from the view, which is the number
    /// the gateway confirmed. The selection is cleared whether the call
    /// succeeds or fails; on failure the tasks stay put and the error is
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Gateway`] (including the configuration class
    /// when the privileged endpoint lacks its credential) or
    /// [`BoardError::Detached`].
    pub async fn complete_selected(&self) -> Result<usize, BoardError> {
        let ids = self.store.lock().selection().to_vec();
        if ids.is_empty() {
            return Ok(0);
        }

        let result = self.gateway.bulk_complete_tasks(&ids).await;
        self.live.ensure()?;

        let mut store = self.store.lock();
        store.clear_selection();
        match result {
            Ok(updated) => {
                let removed = store.remove_tasks(&updated);
                store.clear_error();
                tracing::info!(
                    requested = ids.len(),
                    updated = updated.len(),
                    removed,
                    "bulk complete applied"
                );
                Ok(removed)
            }
            Err(e) => {
                log_gateway_error("bulk_complete_tasks", &e);
                store.set_error(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Captures the selection for deletion. `None` when nothing is selected.
    pub fn request_delete(&self) -> Option<PendingDelete> {
        let ids = self.store.lock().selection().to_vec();
        if ids.is_empty() {
            None
        } else {
            Some(PendingDelete { ids })
        }
    }

    /// Deletes the tasks captured in `pending`.
    ///
    /// Delete is all-or-nothing: on success exactly the captured ids leave
    /// the view and the selection is cleared; on failure nothing changes but
    /// the recorded error.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Gateway`] or [`BoardError::Detached`].
    pub async fn confirm_delete(&self, pending: PendingDelete) -> Result<usize, BoardError> {
        let result = self.gateway.delete_tasks(&pending.ids).await;
        self.live.ensure()?;

        let mut store = self.store.lock();
        match result {
            Ok(()) => {
                let removed = store.remove_tasks(&pending.ids);
                store.clear_selection();
                store.clear_error();
                tracing::info!(requested = pending.ids.len(), removed, "bulk delete applied");
                Ok(removed)
            }
            Err(e) => {
                log_gateway_error("delete_tasks", &e);
                store.set_error(e.to_string());
                Err(e.into())
            }
        }
    }
}
