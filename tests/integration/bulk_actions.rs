//! Integration tests for selection and bulk actions on a loaded board.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use taskboard::board::store::ViewMode;
use taskboard::board::{Board, BoardError};
use taskboard::gateway::memory::{InMemoryGateway, Operation};
use taskboard::gateway::{Gateway, GatewayError};
use taskboard::session::Session;
use taskboard_proto::{BucketKey, ChangeEvent, List, ListId, Task, TaskId, UserId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_task(id: &str, list: Option<&str>, minute: u32) -> Task {
    Task {
        id: TaskId::new(id),
        name: id.to_string(),
        description: None,
        user_id: UserId::new("u-1"),
        list_id: list.map(ListId::new),
        completed: false,
        due_date: None,
        completed_at: None,
        created_at: Utc.with_ymd_and_hms(2025, 5, 1, 8, minute, 0).unwrap(),
    }
}

/// A gateway seeded with list `l-1` holding `ids` as open tasks, and a
/// board loaded from it.
async fn make_loaded_board(ids: &[&str]) -> (Arc<InMemoryGateway>, Board<InMemoryGateway>) {
    let gw = Arc::new(InMemoryGateway::new());
    gw.seed_list(List {
        id: ListId::new("l-1"),
        name: "Errands".to_string(),
        user_id: UserId::new("u-1"),
        created_at: Utc.with_ymd_and_hms(2025, 5, 1, 7, 0, 0).unwrap(),
    });
    for (i, id) in ids.iter().enumerate() {
        gw.seed_task(make_task(id, Some("l-1"), u32::try_from(i).unwrap()));
    }
    let board = Board::new(
        Arc::clone(&gw),
        Session::new(UserId::new("u-1"), "token", None),
        ViewMode::Open,
        16,
    );
    board.load_initial().await.unwrap();
    (gw, board)
}

fn task_ids(board: &Board<InMemoryGateway>) -> Vec<String> {
    board
        .snapshot()
        .buckets
        .iter()
        .flat_map(|b| b.tasks.iter().map(|t| t.id.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn toggle_is_symmetric() {
    let (_gw, board) = make_loaded_board(&["t-1", "t-2"]).await;
    let bulk = board.bulk();

    assert!(bulk.toggle_selection(&TaskId::new("t-1")));
    assert!(bulk.toggle_selection(&TaskId::new("t-2")));
    assert!(!bulk.toggle_selection(&TaskId::new("t-1")));
    assert_eq!(board.snapshot().selected, vec![TaskId::new("t-2")]);
}

#[tokio::test]
async fn ids_outside_the_view_cannot_be_selected() {
    let (_gw, board) = make_loaded_board(&["t-1"]).await;
    assert!(!board.bulk().toggle_selection(&TaskId::new("t-missing")));
    assert!(board.snapshot().selected.is_empty());
}

#[tokio::test]
async fn repeated_select_completes_the_task_once() {
    let (_gw, board) = make_loaded_board(&["t-1", "t-2"]).await;
    let bulk = board.bulk();

    assert!(bulk.select(&TaskId::new("t-1")));
    assert!(bulk.select(&TaskId::new("t-1")));
    assert!(!bulk.select(&TaskId::new("t-missing")));
    assert_eq!(board.snapshot().selected, vec![TaskId::new("t-1")]);

    assert_eq!(bulk.complete_selected().await, Ok(1));
    assert_eq!(task_ids(&board), vec!["t-2"]);
}

// ---------------------------------------------------------------------------
// Bulk complete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_bulk_complete_removes_only_confirmed_ids() {
    let (gw, board) = make_loaded_board(&["t-1", "t-2"]).await;
    let bulk = board.bulk();
    bulk.toggle_selection(&TaskId::new("t-1"));
    bulk.toggle_selection(&TaskId::new("t-2"));

    // t-2 vanishes from the backend before the request lands.
    gw.delete_tasks(&[TaskId::new("t-2")]).await.unwrap();

    let removed = bulk.complete_selected().await.unwrap();

    assert_eq!(removed, 1);
    assert_eq!(task_ids(&board), vec!["t-2"]);
    assert!(board.snapshot().selected.is_empty());
}

#[tokio::test]
async fn complete_with_empty_selection_is_a_no_op() {
    let (gw, board) = make_loaded_board(&["t-1"]).await;
    gw.fail_next(
        Operation::BulkComplete,
        GatewayError::DataAccess("should not be called".to_string()),
    );

    assert_eq!(board.bulk().complete_selected().await, Ok(0));
    assert_eq!(task_ids(&board), vec!["t-1"]);
}

#[tokio::test]
async fn failed_bulk_complete_keeps_tasks_and_clears_selection() {
    let (gw, board) = make_loaded_board(&["t-1", "t-2"]).await;
    let bulk = board.bulk();
    bulk.toggle_selection(&TaskId::new("t-1"));
    gw.fail_next(
        Operation::BulkComplete,
        GatewayError::DataAccess("503".to_string()),
    );

    let err = bulk.complete_selected().await.unwrap_err();

    assert!(matches!(err, BoardError::Gateway(GatewayError::DataAccess(_))));
    assert_eq!(task_ids(&board), vec!["t-1", "t-2"]);
    let snapshot = board.snapshot();
    assert!(snapshot.selected.is_empty());
    assert!(snapshot.last_error.is_some());
}

#[tokio::test]
async fn missing_credential_is_a_configuration_error() {
    let (gw, board) = make_loaded_board(&["t-1"]).await;
    gw.set_privileged_configured(false);
    let bulk = board.bulk();
    bulk.toggle_selection(&TaskId::new("t-1"));

    let err = bulk.complete_selected().await.unwrap_err();

    match err {
        BoardError::Gateway(e) => assert!(e.is_configuration()),
        other => panic!("expected configuration error, got {other:?}"),
    }
    assert_eq!(task_ids(&board), vec!["t-1"]);
}

#[tokio::test]
async fn completion_echo_before_removal_empties_bucket() {
    let (gw, board) = make_loaded_board(&["t-1"]).await;
    board.start_realtime().await.unwrap();

    let mut done = make_task("t-1", Some("l-1"), 0);
    done.completed = true;
    gw.publish(ChangeEvent::TaskUpdated(done)).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let store = board.store();
    assert_eq!(
        store.lock().bucket(&BucketKey::List(ListId::new("l-1"))),
        Some(&[][..])
    );

    // The later bulk removal of the same id is harmless.
    assert_eq!(store.lock().remove_tasks(&[TaskId::new("t-1")]), 0);
    board.teardown().await;
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_needs_a_confirmed_request() {
    let (gw, board) = make_loaded_board(&["t-1", "t-2", "t-3"]).await;
    let bulk = board.bulk();
    assert!(bulk.request_delete().is_none());

    bulk.toggle_selection(&TaskId::new("t-1"));
    bulk.toggle_selection(&TaskId::new("t-3"));
    let pending = bulk.request_delete().unwrap();
    assert_eq!(pending.ids(), &[TaskId::new("t-1"), TaskId::new("t-3")]);

    let removed = bulk.confirm_delete(pending).await.unwrap();

    assert_eq!(removed, 2);
    assert_eq!(task_ids(&board), vec!["t-2"]);
    assert!(board.snapshot().selected.is_empty());
    let remaining: Vec<_> = gw.tasks().into_iter().map(|t| t.id.to_string()).collect();
    assert_eq!(remaining, vec!["t-2"]);
}

#[tokio::test]
async fn dropped_delete_request_deletes_nothing() {
    let (gw, board) = make_loaded_board(&["t-1"]).await;
    let bulk = board.bulk();
    bulk.toggle_selection(&TaskId::new("t-1"));

    drop(bulk.request_delete());

    assert_eq!(gw.tasks().len(), 1);
    assert_eq!(task_ids(&board), vec!["t-1"]);
    assert_eq!(board.snapshot().selected, vec![TaskId::new("t-1")]);
}

#[tokio::test]
async fn failed_delete_leaves_store_untouched() {
    let (gw, board) = make_loaded_board(&["t-1"]).await;
    let bulk = board.bulk();
    bulk.toggle_selection(&TaskId::new("t-1"));
    let pending = bulk.request_delete().unwrap();
    gw.fail_next(
        Operation::DeleteTasks,
        GatewayError::Authorization("not yours".to_string()),
    );

    let err = bulk.confirm_delete(pending).await.unwrap_err();

    assert!(matches!(err, BoardError::Gateway(GatewayError::Authorization(_))));
    assert_eq!(task_ids(&board), vec!["t-1"]);
    assert_eq!(board.snapshot().selected, vec![TaskId::new("t-1")]);
}
