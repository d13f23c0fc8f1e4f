//! Shared data model and wire types for Taskboard.

pub mod api;
pub mod change;
pub mod model;
pub mod row;

pub use change::{ChangeEvent, ChangeKind, Table};
pub use model::{BucketKey, List, ListId, NewList, NewTask, Task, TaskId, TaskPatch, UserId};
