//! Property-based tests for backend row translation.
//!
//! Uses proptest to verify:
//! 1. Arbitrary JSON never panics the row decoders; it converts or errors.
//! 2. Any well-formed task row converts with its columns preserved.
//! 3. Dropping a required column is reported as exactly that column.
//! 4. Change records route to the event variant of their table and kind.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Value, json};
use taskboard_proto::row::{RowError, list_from_json, task_from_json, tasks_from_json};
use taskboard_proto::{ChangeEvent, ChangeKind, Table};

// --- Strategies ---

/// Strategy for arbitrary JSON values, nested a few levels deep.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        ".{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::hash_map("[a-z_]{1,10}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Strategy for timestamps between 2000 and 2100, whole seconds.
fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (946_684_800_i64..4_102_444_800_i64)
        .prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
}

fn arb_id() -> impl Strategy<Value = String> {
    "[a-z0-9-]{1,24}"
}

/// A well-formed task row plus the values it was built from.
#[derive(Debug, Clone)]
struct TaskRowCase {
    id: String,
    name: String,
    user_id: String,
    list_id: Option<String>,
    completed: Option<bool>,
    due_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TaskRowCase {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "description": null,
            "user_id": self.user_id,
            "list_id": self.list_id,
            "completed": self.completed,
            "due_date": self.due_date.map(|d| d.to_rfc3339()),
            "completed_at": null,
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}

fn arb_task_row() -> impl Strategy<Value = TaskRowCase> {
    (
        arb_id(),
        ".{1,40}",
        arb_id(),
        prop::option::of(arb_id()),
        prop::option::of(any::<bool>()),
        prop::option::of(arb_timestamp()),
        arb_timestamp(),
    )
        .prop_map(
            |(id, name, user_id, list_id, completed, due_date, created_at)| TaskRowCase {
                id,
                name,
                user_id,
                list_id,
                completed,
                due_date,
                created_at,
            },
        )
}

// --- Property tests ---

proptest! {
    /// Arbitrary JSON is either converted or rejected, never a panic.
    #[test]
    fn arbitrary_json_never_panics(value in arb_json()) {
        let _ = task_from_json(value.clone());
        let _ = list_from_json(value.clone());
        let _ = tasks_from_json(value);
    }

    /// A well-formed task row keeps its columns through translation.
    #[test]
    fn task_row_preserves_columns(case in arb_task_row()) {
        let task = task_from_json(case.to_json()).expect("well-formed row should convert");
        prop_assert_eq!(task.id.as_str(), case.id.as_str());
        prop_assert_eq!(&task.name, &case.name);
        prop_assert_eq!(task.user_id.as_str(), case.user_id.as_str());
        prop_assert_eq!(task.list_id.as_ref().map(|l| l.as_str().to_string()), case.list_id.clone());
        prop_assert_eq!(task.completed, case.completed.unwrap_or(false));
        prop_assert_eq!(task.due_date, case.due_date);
        prop_assert_eq!(task.created_at, case.created_at);
        prop_assert_eq!(task.description, None);
    }

    /// Removing one required column reports that column.
    #[test]
    fn missing_required_column_is_named(
        case in arb_task_row(),
        column in prop::sample::select(vec!["id", "name", "user_id", "created_at"]),
    ) {
        let mut row = case.to_json();
        row.as_object_mut().expect("row is an object").remove(column);
        let err = task_from_json(row).expect_err("row without a required column");
        prop_assert_eq!(err, RowError::MissingColumn { table: "tasks", column });
    }

    /// A batch fails as a whole if any row is bad.
    #[test]
    fn batch_fails_on_any_bad_row(
        cases in prop::collection::vec(arb_task_row(), 1..8),
        bad_index in any::<prop::sample::Index>(),
    ) {
        let mut rows: Vec<Value> = cases.iter().map(TaskRowCase::to_json).collect();
        let good = tasks_from_json(Value::Array(rows.clone())).expect("all rows valid");
        prop_assert_eq!(good.len(), cases.len());

        let i = bad_index.index(rows.len());
        rows[i]["created_at"] = json!("not a time");
        prop_assert!(tasks_from_json(Value::Array(rows)).is_err());
    }

    /// Task records become task events of the matching kind; list updates
    /// are not tracked.
    #[test]
    fn change_records_route_by_table_and_kind(case in arb_task_row()) {
        let inserted = ChangeEvent::from_record(Table::Tasks, ChangeKind::Insert, case.to_json())
            .expect("valid record");
        prop_assert!(matches!(inserted, Some(ChangeEvent::TaskInserted(_))));

        let updated = ChangeEvent::from_record(Table::Tasks, ChangeKind::Update, case.to_json())
            .expect("valid record");
        prop_assert!(matches!(updated, Some(ChangeEvent::TaskUpdated(_))));

        let list_update = ChangeEvent::from_record(Table::Lists, ChangeKind::Update, case.to_json())
            .expect("ignored record");
        prop_assert!(list_update.is_none());
    }
}
