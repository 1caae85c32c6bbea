//! PostgreSQL store contract. Runs only when `DATABASE_URL` points at a
//! database the tests may migrate.

mod common;

use uuid::Uuid;

use common::*;
use commissioner_core::config::DatabaseConfig;
use commissioner_core::database::{PgStore, TaskRunStore, UniverseStore};
use commissioner_core::models::{SubTaskGroupType, SubTaskRun, TargetKind, TaskType};
use commissioner_core::{CommissionerError, ConflictReason, TaskRun, TaskRunEvent};

async fn connect() -> Option<PgStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = DatabaseConfig {
        url: Some(url),
        ..Default::default()
    };
    let store = PgStore::connect(&config).await.expect("connect to DATABASE_URL");
    store.migrate().await.expect("apply migrations");
    Some(store)
}

#[tokio::test]
async fn test_pg_save_is_compare_and_swap() {
    let Some(store) = connect().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    assert!(store.health_check().await.unwrap());

    let universe = three_node_universe(&format!("pg-{}", Uuid::new_v4()));
    store.insert_universe(&universe).await.unwrap();

    assert_eq!(store.save_universe(&universe, 1).await.unwrap(), 2);
    let err = store.save_universe(&universe, 1).await.unwrap_err();
    assert!(matches!(
        err,
        CommissionerError::Conflict {
            reason: ConflictReason::VersionMismatch { expected: 1, found: 2 },
            ..
        }
    ));

    let stored = store.find_universe(universe.id()).await.unwrap().unwrap();
    assert_eq!(stored.version(), 2);
    assert_eq!(stored.definition().nodes.len(), 3);
}

#[tokio::test]
async fn test_pg_cascade_delete_removes_run_and_subtasks() {
    let Some(store) = connect().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let mut run = TaskRun::new(
        "RemoveNodeFromUniverse",
        TaskType::Remove,
        TargetKind::Node,
        Uuid::new_v4(),
        "n3",
        serde_json::json!({ "node_name": "n3" }),
    );
    store.insert_task_run(&run).await.unwrap();
    let rows: Vec<SubTaskRun> = (0..3)
        .map(|position| {
            SubTaskRun::new(run.id, position, "SetNodeState", 0, SubTaskGroupType::ConfigureUniverse)
        })
        .collect();
    store.insert_subtask_runs(&rows).await.unwrap();

    assert_eq!(store.cascade_delete_completed(run.id).await.unwrap(), 0);

    run.transition(TaskRunEvent::Start).unwrap();
    run.transition(TaskRunEvent::fail("tserver unreachable")).unwrap();
    store.update_task_run(&run).await.unwrap();

    let stored = store.find_task_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.error_message.as_deref(), Some("tserver unreachable"));

    assert_eq!(store.cascade_delete_completed(run.id).await.unwrap(), 4);
    assert!(store.find_task_run(run.id).await.unwrap().is_none());
    assert!(store.list_subtask_runs(run.id).await.unwrap().is_empty());
}
