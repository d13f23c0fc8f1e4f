//! Core entities shared by the client, the gateways and the privileged API.
//!
//! Identifiers are opaque strings assigned by the backend. Entities here are
//! already validated; untyped backend rows are converted in [`crate::row`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a backend-assigned identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a [`List`].
    ListId
);
opaque_id!(
    /// Identifier of a [`Task`].
    TaskId
);
opaque_id!(
    /// Identifier of the user owning lists, tasks and a profile.
    UserId
);

/// Display key of the bucket holding tasks without a list.
pub const UNLISTED_KEY: &str = "__nolst__";

/// A named grouping of tasks owned by one user. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    /// Backend-assigned identifier.
    pub id: ListId,
    /// Display name.
    pub name: String,
    /// Owning user.
    pub user_id: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A unit of work, optionally assigned to a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Backend-assigned identifier.
    pub id: TaskId,
    /// Short name shown in the task list.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Owning user.
    pub user_id: UserId,
    /// List the task belongs to; `None` means unlisted.
    pub list_id: Option<ListId>,
    /// Completion flag.
    pub completed: bool,
    /// Optional due time.
    pub due_date: Option<DateTime<Utc>>,
    /// When the task was completed, if it was.
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation time; buckets are ordered by it.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Returns the bucket this task belongs to, derived from `list_id` only.
    #[must_use]
    pub fn bucket_key(&self) -> BucketKey {
        self.list_id
            .as_ref()
            .map_or(BucketKey::Unlisted, |id| BucketKey::List(id.clone()))
    }

    /// Returns `true` if the task is incomplete and its due time is before `now`.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < now)
    }
}

/// Key of one bucket in the grouped task view.
///
/// Ordering puts list buckets first (by id) and the unlisted bucket last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BucketKey {
    /// Tasks assigned to the given list.
    List(ListId),
    /// Tasks without a list.
    Unlisted,
}

impl BucketKey {
    /// Returns the list identifier, or `None` for the unlisted bucket.
    #[must_use]
    pub const fn list_id(&self) -> Option<&ListId> {
        match self {
            Self::List(id) => Some(id),
            Self::Unlisted => None,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(id) => write!(f, "{id}"),
            Self::Unlisted => f.write_str(UNLISTED_KEY),
        }
    }
}

/// Fields required to create a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewList {
    /// Display name, already trimmed and non-empty.
    pub name: String,
    /// Owning user.
    pub user_id: UserId,
}

/// Fields required to create a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Task name, already trimmed and non-empty.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional due time.
    pub due_date: Option<DateTime<Utc>>,
    /// Owning user.
    pub user_id: UserId,
    /// Target list; `None` creates an unlisted task.
    pub list_id: Option<ListId>,
}

/// Partial update of a task. `None` leaves a field unchanged.
///
/// `description` and `due_date` use a nested `Option` so they can be cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description; `Some(None)` clears it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    /// New due time; `Some(None)` clears it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    /// New completion flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// Completion time, set together with `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    /// A patch marking a task completed at `now`.
    #[must_use]
    pub fn complete(now: DateTime<Utc>) -> Self {
        Self {
            completed: Some(true),
            completed_at: Some(Some(now)),
            ..Self::default()
        }
    }

    /// Applies the patch to a task in place.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.completed.is_none()
            && self.completed_at.is_none()
    }
}
