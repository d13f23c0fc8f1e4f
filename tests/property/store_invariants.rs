//! Property-based tests for the task store.
//!
//! Uses proptest to verify that after any sequence of loads, realtime
//! events, removals and selection toggles:
//! 1. every task sits in exactly one bucket, the one named by its list id;
//! 2. buckets are ordered by creation time;
//! 3. only the session user's tasks admitted by the view mode are held;
//! 4. every selected id is present;
//! 5. every known list has a bucket, and an empty bucket always belongs to
//!    a known list.
//!
//! Plus the bulk-completion and idempotence properties of the store.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use taskboard::board::store::{TaskStore, ViewMode};
use taskboard_proto::{BucketKey, ChangeEvent, List, ListId, Task, TaskId, UserId};

const ME: &str = "u-me";

// --- Strategies ---

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(i64::from(minute))
}

/// Small id spaces so operations collide often.
fn arb_task(owner_pool: &'static [&'static str]) -> impl Strategy<Value = Task> {
    (
        0..8_u8,
        prop::sample::select(owner_pool),
        prop::option::of(0..3_u8),
        any::<bool>(),
        0..120_u32,
    )
        .prop_map(|(id, owner, list, completed, minute)| Task {
            id: TaskId::new(format!("t-{id}")),
            name: format!("task {id}"),
            description: None,
            user_id: UserId::new(owner),
            list_id: list.map(|l| ListId::new(format!("l-{l}"))),
            completed,
            due_date: None,
            completed_at: None,
            created_at: at(minute),
        })
}

fn arb_list() -> impl Strategy<Value = List> {
    (0..3_u8, prop::sample::select(&OWNERS[..]), 0..60_u32).prop_map(|(id, owner, minute)| {
        List {
            id: ListId::new(format!("l-{id}")),
            name: format!("list {id}"),
            user_id: UserId::new(owner),
            created_at: at(minute),
        }
    })
}

#[derive(Debug, Clone)]
enum Op {
    Load(Vec<List>, Vec<Task>),
    Event(ChangeEvent),
    Remove(Vec<u8>),
    Toggle(u8),
    MergeLists(Vec<List>),
}

static OWNERS: [&str; 2] = [ME, "u-other"];

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => (
            prop::collection::vec(arb_list(), 0..3),
            prop::collection::vec(arb_task(&OWNERS), 0..6)
        )
            .prop_map(|(lists, tasks)| Op::Load(lists, tasks)),
        4 => arb_task(&OWNERS).prop_map(|t| Op::Event(ChangeEvent::TaskInserted(t))),
        4 => arb_task(&OWNERS).prop_map(|t| Op::Event(ChangeEvent::TaskUpdated(t))),
        1 => arb_list().prop_map(|l| Op::Event(ChangeEvent::ListInserted(l))),
        2 => prop::collection::vec(0..8_u8, 0..4).prop_map(Op::Remove),
        3 => (0..8_u8).prop_map(Op::Toggle),
        1 => prop::collection::vec(arb_list(), 0..3).prop_map(Op::MergeLists),
    ]
}

fn arb_mode() -> impl Strategy<Value = ViewMode> {
    prop_oneof![Just(ViewMode::Open), Just(ViewMode::Completed)]
}

// --- Helpers ---

fn run(store: &mut TaskStore, op: Op) {
    match op {
        Op::Load(lists, tasks) => store.replace(lists, tasks),
        Op::Event(event) => {
            store.apply(event);
        }
        Op::Remove(ids) => {
            let ids: Vec<TaskId> = ids.into_iter().map(|i| TaskId::new(format!("t-{i}"))).collect();
            store.remove_tasks(&ids);
        }
        Op::Toggle(id) => {
            store.toggle_selection(&TaskId::new(format!("t-{id}")));
        }
        Op::MergeLists(lists) => {
            store.merge_lists(lists);
        }
    }
}

fn check_invariants(store: &TaskStore) -> Result<(), TestCaseError> {
    let mut seen = HashSet::new();
    for (key, tasks) in store.buckets() {
        for pair in tasks.windows(2) {
            prop_assert!(pair[0].created_at <= pair[1].created_at, "bucket {key} out of order");
        }
        for task in tasks {
            prop_assert_eq!(&task.bucket_key(), key);
            prop_assert!(seen.insert(task.id.clone()), "{} held twice", task.id);
            prop_assert_eq!(task.user_id.as_str(), ME);
            prop_assert!(store.mode().admits(task));
        }
    }
    for id in store.selection().iter() {
        prop_assert!(seen.contains(id), "selected {id} not in view");
    }
    let mut list_ids = HashSet::new();
    for list in store.lists() {
        prop_assert!(list_ids.insert(list.id.clone()), "list {} held twice", list.id);
        prop_assert_eq!(list.user_id.as_str(), ME);
        prop_assert!(
            store.bucket(&BucketKey::List(list.id.clone())).is_some(),
            "list {} has no bucket",
            list.id
        );
    }
    for (key, tasks) in store.buckets() {
        if let (BucketKey::List(id), true) = (key, tasks.is_empty()) {
            prop_assert!(list_ids.contains(id), "empty bucket {id} has no list");
        }
    }
    prop_assert_eq!(store.task_count(), seen.len());
    Ok(())
}

fn open_task(id: &str, minute: u32) -> Task {
    Task {
        id: TaskId::new(id),
        name: id.to_string(),
        description: None,
        user_id: UserId::new(ME),
        list_id: None,
        completed: false,
        due_date: None,
        completed_at: None,
        created_at: at(minute),
    }
}

// --- Property tests ---

proptest! {
    /// Store invariants hold after every operation in any sequence.
    #[test]
    fn invariants_hold_under_any_operation_sequence(
        mode in arb_mode(),
        ops in prop::collection::vec(arb_op(), 0..40),
    ) {
        let mut store = TaskStore::new(UserId::new(ME), mode);
        for op in ops {
            run(&mut store, op);
            check_invariants(&store)?;
        }
    }

    /// Inserting the same task any number of times leaves one copy.
    #[test]
    fn repeated_insert_is_idempotent(task in arb_task(&[ME]), times in 1..5_usize) {
        let mut store = TaskStore::new(UserId::new(ME), ViewMode::Open);
        for _ in 0..times {
            store.apply(ChangeEvent::TaskInserted(task.clone()));
        }
        let expected = usize::from(!task.completed);
        prop_assert_eq!(store.task_count(), expected);
    }

    /// An update marking a task completed removes it from the open view,
    /// whichever bucket it was in.
    #[test]
    fn completed_update_leaves_no_bucket(task in arb_task(&[ME]), moved in prop::option::of(0..3_u8)) {
        let mut open = task.clone();
        open.completed = false;
        let mut store = TaskStore::new(UserId::new(ME), ViewMode::Open);
        store.apply(ChangeEvent::TaskInserted(open.clone()));

        let mut done = open;
        done.completed = true;
        done.list_id = moved.map(|l| ListId::new(format!("l-{l}")));
        store.apply(ChangeEvent::TaskUpdated(done));

        prop_assert!(!store.contains_task(&task.id));
        prop_assert!(store.buckets().all(|(_, tasks)| tasks.is_empty()));
    }

    /// Removing the confirmed subset of a selection removes exactly that
    /// subset; the rest stays.
    #[test]
    fn removing_confirmed_subset_keeps_the_rest(
        selected in prop::collection::btree_set(0..10_u8, 1..10),
        confirm_mask in prop::collection::vec(any::<bool>(), 10),
    ) {
        let mut store = TaskStore::new(UserId::new(ME), ViewMode::Open);
        let tasks: Vec<Task> = (0..10_u32).map(|i| open_task(&format!("t-{i}"), i)).collect();
        store.replace(Vec::new(), tasks);
        for i in &selected {
            store.toggle_selection(&TaskId::new(format!("t-{i}")));
        }

        let updated: Vec<TaskId> = selected
            .iter()
            .filter(|i| confirm_mask[usize::from(**i)])
            .map(|i| TaskId::new(format!("t-{i}")))
            .collect();
        store.clear_selection();
        let removed = store.remove_tasks(&updated);

        prop_assert_eq!(removed, updated.len());
        for i in 0..10_u8 {
            let id = TaskId::new(format!("t-{i}"));
            prop_assert_eq!(store.contains_task(&id), !updated.contains(&id));
        }
        prop_assert!(store.selection().is_empty());
    }

    /// A load followed by no events reproduces the loaded tasks grouped by
    /// list id.
    #[test]
    fn load_reproduces_gateway_grouping(tasks in prop::collection::vec(arb_task(&[ME]), 0..12)) {
        let mut unique = Vec::new();
        let mut ids = HashSet::new();
        for task in tasks {
            if !task.completed && ids.insert(task.id.clone()) {
                unique.push(task);
            }
        }
        let mut store = TaskStore::new(UserId::new(ME), ViewMode::Open);
        store.replace(Vec::new(), unique.clone());

        prop_assert_eq!(store.task_count(), unique.len());
        for task in &unique {
            let bucket = store.bucket(&task.bucket_key()).unwrap_or_default();
            prop_assert!(bucket.iter().any(|t| t == task));
        }
        let unlisted = store.bucket(&BucketKey::Unlisted).map_or(0, <[Task]>::len);
        prop_assert_eq!(unlisted, unique.iter().filter(|t| t.list_id.is_none()).count());
    }
}
