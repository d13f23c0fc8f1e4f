//! Translation of loosely typed backend rows into [`List`] and [`Task`].
//!
//! Both REST responses and realtime change records arrive as JSON objects
//! whose columns may be missing or null. This is the only place that looks
//! at them; everything downstream works with the typed entities.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::model::{List, ListId, Task, TaskId, UserId};

/// Errors produced while converting a backend row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// The payload was not a JSON object of the expected shape.
    #[error("malformed {table} row: {reason}")]
    Malformed {
        /// Table the row came from.
        table: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// A required column was absent or null.
    #[error("{table} row is missing required column `{column}`")]
    MissingColumn {
        /// Table the row came from.
        table: &'static str,
        /// Column name.
        column: &'static str,
    },

    /// A timestamp column could not be parsed.
    #[error("{table}.{column} is not a timestamp: {value}")]
    BadTimestamp {
        /// Table the row came from.
        table: &'static str,
        /// Column name.
        column: &'static str,
        /// The raw value.
        value: String,
    },
}

/// Raw `lists` row as the backend returns it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListRow {
    id: Option<String>,
    name: Option<String>,
    user_id: Option<String>,
    created_at: Option<String>,
}

/// Raw `tasks` row as the backend returns it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaskRow {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    user_id: Option<String>,
    list_id: Option<String>,
    completed: Option<bool>,
    due_date: Option<String>,
    completed_at: Option<String>,
    created_at: Option<String>,
}

const LISTS: &str = "lists";
const TASKS: &str = "tasks";

/// Converts one `lists` row.
///
/// # Errors
///
/// Returns [`RowError`] if the value is not an object, a required column
/// (`id`, `name`, `user_id`, `created_at`) is missing, or the timestamp is
/// unparseable.
pub fn list_from_json(value: serde_json::Value) -> Result<List, RowError> {
    let row: ListRow = serde_json::from_value(value).map_err(|e| RowError::Malformed {
        table: LISTS,
        reason: e.to_string(),
    })?;

    Ok(List {
        id: ListId::new(required(LISTS, "id", row.id)?),
        name: required(LISTS, "name", row.name)?,
        user_id: UserId::new(required(LISTS, "user_id", row.user_id)?),
        created_at: parse_timestamp(LISTS, "created_at", &required(LISTS, "created_at", row.created_at)?)?,
    })
}

/// Converts one `tasks` row.
///
/// A null `completed` column reads as `false`; empty `list_id` and
/// `description` strings read as absent.
///
/// # Errors
///
/// Returns [`RowError`] if the value is not an object, a required column
/// (`id`, `name`, `user_id`, `created_at`) is missing, or a timestamp is
/// unparseable.
pub fn task_from_json(value: serde_json::Value) -> Result<Task, RowError> {
    let row: TaskRow = serde_json::from_value(value).map_err(|e| RowError::Malformed {
        table: TASKS,
        reason: e.to_string(),
    })?;

    let created_at = required(TASKS, "created_at", row.created_at)?;
    Ok(Task {
        id: TaskId::new(required(TASKS, "id", row.id)?),
        name: required(TASKS, "name", row.name)?,
        description: row.description.filter(|d| !d.is_empty()),
        user_id: UserId::new(required(TASKS, "user_id", row.user_id)?),
        list_id: row.list_id.filter(|id| !id.is_empty()).map(ListId::new),
        completed: row.completed.unwrap_or(false),
        due_date: optional_timestamp(TASKS, "due_date", row.due_date.as_deref())?,
        completed_at: optional_timestamp(TASKS, "completed_at", row.completed_at.as_deref())?,
        created_at: parse_timestamp(TASKS, "created_at", &created_at)?,
    })
}

/// Converts a JSON array of `lists` rows, failing on the first bad row.
///
/// # Errors
///
/// Returns [`RowError`] if the payload is not an array or any row is invalid.
pub fn lists_from_json(value: serde_json::Value) -> Result<Vec<List>, RowError> {
    rows(LISTS, value)?.into_iter().map(list_from_json).collect()
}

/// Converts a JSON array of `tasks` rows, failing on the first bad row.
///
/// # Errors
///
/// Returns [`RowError`] if the payload is not an array or any row is invalid.
pub fn tasks_from_json(value: serde_json::Value) -> Result<Vec<Task>, RowError> {
    rows(TASKS, value)?.into_iter().map(task_from_json).collect()
}

fn rows(table: &'static str, value: serde_json::Value) -> Result<Vec<serde_json::Value>, RowError> {
    match value {
        serde_json::Value::Array(rows) => Ok(rows),
        other => Err(RowError::Malformed {
            table,
            reason: format!("expected an array of rows, got {other}"),
        }),
    }
}

fn required(
    table: &'static str,
    column: &'static str,
    value: Option<String>,
) -> Result<String, RowError> {
    value.ok_or(RowError::MissingColumn { table, column })
}

fn optional_timestamp(
    table: &'static str,
    column: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, RowError> {
    match value {
        None | Some("") => Ok(None),
        Some(raw) => parse_timestamp(table, column, raw).map(Some),
    }
}

/// Parses RFC 3339, falling back to a naive ISO-8601 timestamp read as UTC.
fn parse_timestamp(
    table: &'static str,
    column: &'static str,
    raw: &str,
) -> Result<DateTime<Utc>, RowError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| RowError::BadTimestamp {
            table,
            column,
            value: raw.to_string(),
        })
}
