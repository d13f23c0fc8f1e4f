//! Realtime change events delivered by the backend's change feed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{List, Task, UserId};
use crate::row::{self, RowError};

/// A table that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    /// The `lists` relation.
    Lists,
    /// The `tasks` relation.
    Tasks,
}

impl Table {
    /// Relation name as used by the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lists => "lists",
            Self::Tasks => "tasks",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of row change carried by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
}

/// A typed change, ready to be applied to the task store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A list was created.
    ListInserted(List),
    /// A task was created.
    TaskInserted(Task),
    /// A task was updated; carries the full new row.
    TaskUpdated(Task),
}

impl ChangeEvent {
    /// Builds a typed event from a raw change record.
    ///
    /// Returns `Ok(None)` for changes the client does not track (list updates).
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] if the record does not convert.
    pub fn from_record(
        table: Table,
        kind: ChangeKind,
        record: serde_json::Value,
    ) -> Result<Option<Self>, RowError> {
        match (table, kind) {
            (Table::Lists, ChangeKind::Insert) => {
                row::list_from_json(record).map(|l| Some(Self::ListInserted(l)))
            }
            (Table::Lists, ChangeKind::Update) => Ok(None),
            (Table::Tasks, ChangeKind::Insert) => {
                row::task_from_json(record).map(|t| Some(Self::TaskInserted(t)))
            }
            (Table::Tasks, ChangeKind::Update) => {
                row::task_from_json(record).map(|t| Some(Self::TaskUpdated(t)))
            }
        }
    }

    /// The table this event belongs to.
    #[must_use]
    pub const fn table(&self) -> Table {
        match self {
            Self::ListInserted(_) => Table::Lists,
            Self::TaskInserted(_) | Self::TaskUpdated(_) => Table::Tasks,
        }
    }

    /// Owner of the changed row.
    #[must_use]
    pub const fn owner(&self) -> &UserId {
        match self {
            Self::ListInserted(list) => &list.user_id,
            Self::TaskInserted(task) | Self::TaskUpdated(task) => &task.user_id,
        }
    }
}
