//! Applies realtime change events to the store.
//!
//! `start` subscribes the `lists` and `tasks` tables into one bounded queue
//! and spawns a single apply loop that drains it in delivery order. Each
//! event is applied in one locked step; cross-tenant rows are dropped by the
//! store's owner filter. There is no automatic resubscribe.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use taskboard_proto::{ChangeEvent, Table};

use super::store::TaskStore;
use super::{BoardError, Liveness, log_gateway_error, reconcile_missing};
use crate::gateway::{Gateway, SubscriptionHandle};

/// Subscription lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// No subscriptions.
    Unsubscribed,
    /// Subscribe calls in flight.
    Subscribing,
    /// Both tables subscribed and the apply loop running.
    Active,
}

/// Realtime subscriptions and the loop applying their events.
pub struct Reconciler<G> {
    gateway: Arc<G>,
    store: Arc<Mutex<TaskStore>>,
    live: Liveness,
    capacity: usize,
    state: ReconcilerState,
    handles: Vec<SubscriptionHandle>,
    apply_task: Option<JoinHandle<()>>,
}

impl<G: Gateway + 'static> Reconciler<G> {
    /// Creates an unsubscribed reconciler with a queue of `capacity` events.
    pub fn new(
        gateway: Arc<G>,
        store: Arc<Mutex<TaskStore>>,
        live: Liveness,
        capacity: usize,
    ) -> Self {
        Self {
            gateway,
            store,
            live,
            capacity: capacity.max(1),
            state: ReconcilerState::Unsubscribed,
            handles: Vec::new(),
            apply_task: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ReconcilerState {
        self.state
    }

    /// Subscribes both tables and starts applying events.
    ///
    /// No-op unless unsubscribed. If either subscription fails, any that
    /// succeeded are closed, the state returns to
    /// [`ReconcilerState::Unsubscribed`] and the error is recorded.
    ///
    /// # Errors
    ///
    /// Returns the subscribe failure.
    pub async fn start(&mut self) -> Result<(), BoardError> {
        if self.state != ReconcilerState::Unsubscribed {
            return Ok(());
        }
        self.state = ReconcilerState::Subscribing;

        let (tx, rx) = mpsc::channel(self.capacity);
        let mut handles = Vec::with_capacity(2);
        for table in [Table::Lists, Table::Tasks] {
            match self.gateway.subscribe_changes(table, tx.clone()).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    log_gateway_error("subscribe_changes", &e);
                    for handle in handles {
                        self.gateway.unsubscribe(handle).await;
                    }
                    self.store.lock().set_error(e.to_string());
                    self.state = ReconcilerState::Unsubscribed;
                    return Err(e.into());
                }
            }
        }
        drop(tx);

        self.apply_task = Some(tokio::spawn(apply_loop(
            rx,
            Arc::clone(&self.gateway),
            Arc::clone(&self.store),
            self.live.clone(),
        )));
        self.handles = handles;
        self.state = ReconcilerState::Active;
        tracing::info!(capacity = self.capacity, "realtime reconciler active");
        Ok(())
    }

    /// Unsubscribes both tables and ends the apply loop. Queued events that
    /// were not applied yet are dropped.
    pub async fn stop(&mut self) {
        if self.state == ReconcilerState::Unsubscribed {
            return;
        }
        for handle in std::mem::take(&mut self.handles) {
            self.gateway.unsubscribe(handle).await;
        }
        if let Some(task) = self.apply_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.state = ReconcilerState::Unsubscribed;
        tracing::info!("realtime reconciler stopped");
    }
}

async fn apply_loop<G: Gateway>(
    mut rx: mpsc::Receiver<ChangeEvent>,
    gateway: Arc<G>,
    store: Arc<Mutex<TaskStore>>,
    live: Liveness,
) {
    while let Some(event) = rx.recv().await {
        if !live.is_live() {
            break;
        }
        let table = event.table();
        let diverged = {
            let mut store = store.lock();
            let changed = store.apply(event);
            changed && !store.missing_list_ids().is_empty()
        };
        tracing::trace!(%table, diverged, "realtime event applied");

        if diverged {
            if let Err(e) = reconcile_missing(&*gateway, &store, &live).await {
                tracing::debug!(err = %e, "list metadata reconcile failed");
            }
        }
    }
    tracing::debug!("realtime apply loop exiting");
}
