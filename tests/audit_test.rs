//! Audit trail retention: completed runs leave with all their subtask rows or
//! not at all.

mod common;

use chrono::{Duration, Utc};
use uuid::Uuid;

use common::*;
use commissioner_core::database::{InMemoryStore, TaskRunStore};
use commissioner_core::models::{SubTaskGroupType, SubTaskRun, TargetKind, TaskType};
use commissioner_core::{TaskRun, TaskRunEvent, TaskRunState};

async fn run_with_subtasks(store: &InMemoryStore, subtasks: usize) -> TaskRun {
    let run = TaskRun::new(
        "RemoveNodeFromUniverse",
        TaskType::Remove,
        TargetKind::Node,
        Uuid::new_v4(),
        "n2",
        serde_json::Value::Null,
    );
    store.insert_task_run(&run).await.unwrap();
    let rows: Vec<SubTaskRun> = (0..subtasks)
        .map(|position| {
            SubTaskRun::new(
                run.id,
                position as i32,
                "SetNodeState",
                position as i32,
                SubTaskGroupType::ConfigureUniverse,
            )
        })
        .collect();
    store.insert_subtask_runs(&rows).await.unwrap();
    run
}

async fn finish_subtasks(store: &InMemoryStore, run_id: Uuid) {
    for mut row in store.list_subtask_runs(run_id).await.unwrap() {
        row.transition(TaskRunEvent::Start).unwrap();
        row.transition(TaskRunEvent::Succeed).unwrap();
        store.update_subtask_run(&row).await.unwrap();
    }
}

async fn complete(store: &InMemoryStore, run: &mut TaskRun, event: TaskRunEvent) {
    run.transition(TaskRunEvent::Start).unwrap();
    run.transition(event).unwrap();
    store.update_task_run(run).await.unwrap();
}

#[tokio::test]
async fn test_completed_run_is_deleted_with_its_subtasks() {
    let store = InMemoryStore::new();
    let mut run = run_with_subtasks(&store, 5).await;
    let other = run_with_subtasks(&store, 2).await;
    finish_subtasks(&store, run.id).await;
    complete(&store, &mut run, TaskRunEvent::Succeed).await;
    assert_eq!(store.audit_row_count(), 9);

    assert_eq!(store.cascade_delete_completed(run.id).await.unwrap(), 6);
    assert_eq!(store.audit_row_count(), 3);
    assert!(store.find_task_run(run.id).await.unwrap().is_none());
    assert!(store.list_subtask_runs(run.id).await.unwrap().is_empty());
    assert_eq!(store.list_subtask_runs(other.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_incomplete_run_is_left_alone() {
    let store = InMemoryStore::new();
    let run = run_with_subtasks(&store, 3).await;

    assert_eq!(store.cascade_delete_completed(run.id).await.unwrap(), 0);
    assert_eq!(store.audit_row_count(), 4);
    assert_eq!(store.cascade_delete_completed(Uuid::new_v4()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_successful_run_with_unfinished_subtasks_is_kept() {
    let store = InMemoryStore::new();
    let mut run = run_with_subtasks(&store, 3).await;
    complete(&store, &mut run, TaskRunEvent::Succeed).await;

    assert_eq!(store.cascade_delete_completed(run.id).await.unwrap(), 0);
    assert_eq!(store.audit_row_count(), 4);
}

#[tokio::test]
async fn test_failed_run_is_deleted_even_with_unfinished_subtasks() {
    let store = InMemoryStore::new();
    let mut run = run_with_subtasks(&store, 3).await;
    complete(&store, &mut run, TaskRunEvent::fail("boom")).await;

    assert_eq!(store.cascade_delete_completed(run.id).await.unwrap(), 4);
    assert_eq!(store.audit_row_count(), 0);
}

#[tokio::test]
async fn test_commissioner_deletes_completed_history() {
    let harness = TestHarness::new(fast_config());
    let mut finished = run_with_subtasks(&harness.store, 2).await;
    finish_subtasks(&harness.store, finished.id).await;
    complete(&harness.store, &mut finished, TaskRunEvent::Succeed).await;
    let running = run_with_subtasks(&harness.store, 1).await;

    let commissioner = harness.commissioner();
    let deleted = commissioner
        .delete_completed_before(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(deleted, 3);
    assert_eq!(
        commissioner.get_status(running.id).await.unwrap().state,
        TaskRunState::Created
    );
    assert!(commissioner.get_status(finished.id).await.is_err());

    // Nothing completed before the epoch
    let deleted = commissioner
        .delete_completed_before(Utc::now() - Duration::days(365))
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}
