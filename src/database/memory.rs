//! In-memory store used by tests and embedded deployments.
//!
//! Everything lives behind one `parking_lot` lock, so a compare-and-swap or a
//! cascade delete is observed atomically by every other caller.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{TaskRunStore, UniverseStore};
use crate::error::{CommissionerError, Result};
use crate::models::{SubTaskRun, TaskRun, TaskRunFilter, Universe};
use crate::state_machine::TaskRunState;

#[derive(Default)]
struct Inner {
    universes: HashMap<Uuid, Universe>,
    task_runs: HashMap<Uuid, TaskRun>,
    subtask_runs: HashMap<Uuid, Vec<SubTaskRun>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total audit rows currently held (task runs plus subtask runs)
    pub fn audit_row_count(&self) -> usize {
        let inner = self.inner.read();
        inner.task_runs.len() + inner.subtask_runs.values().map(Vec::len).sum::<usize>()
    }
}

#[async_trait]
impl UniverseStore for InMemoryStore {
    async fn find_universe(&self, id: Uuid) -> Result<Option<Universe>> {
        Ok(self.inner.read().universes.get(&id).cloned())
    }

    async fn find_universes(&self) -> Result<Vec<Universe>> {
        let mut universes: Vec<Universe> = self.inner.read().universes.values().cloned().collect();
        universes.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(universes)
    }

    async fn insert_universe(&self, universe: &Universe) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.universes.contains_key(&universe.id()) {
            return Err(CommissionerError::Validation(format!(
                "universe {} already exists",
                universe.id()
            )));
        }
        inner.universes.insert(universe.id(), universe.clone());
        Ok(())
    }

    async fn save_universe(&self, universe: &Universe, expected_version: i64) -> Result<i64> {
        let mut inner = self.inner.write();
        let stored = inner
            .universes
            .get_mut(&universe.id())
            .ok_or_else(|| CommissionerError::not_found("universe", universe.id()))?;

        if stored.version() != expected_version {
            return Err(CommissionerError::version_mismatch(
                universe.id(),
                expected_version,
                stored.version(),
            ));
        }

        let new_version = expected_version + 1;
        *stored = Universe::restore(
            stored.id(),
            stored.name().to_string(),
            new_version,
            universe.definition().clone(),
            stored.created_at(),
            Utc::now(),
        );
        Ok(new_version)
    }
}

#[async_trait]
impl TaskRunStore for InMemoryStore {
    async fn insert_task_run(&self, run: &TaskRun) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.task_runs.contains_key(&run.id) {
            return Err(CommissionerError::Validation(format!(
                "task run {} already exists",
                run.id
            )));
        }
        inner.task_runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_task_run(&self, run: &TaskRun) -> Result<()> {
        let mut inner = self.inner.write();
        let stored = inner
            .task_runs
            .get_mut(&run.id)
            .ok_or_else(|| CommissionerError::not_found("task_run", run.id))?;
        if stored.state.is_terminal() {
            return Err(CommissionerError::InvalidTransition {
                entity: "task_run".to_string(),
                from: stored.state.to_string(),
                to: run.state.to_string(),
            });
        }
        *stored = run.clone();
        Ok(())
    }

    async fn find_task_run(&self, id: Uuid) -> Result<Option<TaskRun>> {
        Ok(self.inner.read().task_runs.get(&id).cloned())
    }

    async fn find_task_runs(&self, filter: &TaskRunFilter) -> Result<Vec<TaskRun>> {
        let mut runs: Vec<TaskRun> = self
            .inner
            .read()
            .task_runs
            .values()
            .filter(|run| filter.matches(run))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(runs.into_iter().skip(filter.offset).take(limit).collect())
    }

    async fn find_incomplete_by_target(&self, target_id: Uuid) -> Result<Vec<TaskRun>> {
        let mut runs: Vec<TaskRun> = self
            .inner
            .read()
            .task_runs
            .values()
            .filter(|run| run.target_id == target_id && !run.state.is_terminal())
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(runs)
    }

    async fn find_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TaskRun>> {
        let mut runs: Vec<TaskRun> = self
            .inner
            .read()
            .task_runs
            .values()
            .filter(|run| {
                run.state.is_terminal() && run.completed_at.is_some_and(|done| done < cutoff)
            })
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(runs)
    }

    async fn insert_subtask_runs(&self, runs: &[SubTaskRun]) -> Result<()> {
        let mut inner = self.inner.write();
        // The whole batch is checked before any row is written
        let mut batch = HashSet::new();
        for run in runs {
            if !inner.task_runs.contains_key(&run.parent_id) {
                return Err(CommissionerError::not_found("task_run", run.parent_id));
            }
            let stored = inner
                .subtask_runs
                .get(&run.parent_id)
                .is_some_and(|siblings| siblings.iter().any(|s| s.position == run.position));
            if stored || !batch.insert((run.parent_id, run.position)) {
                return Err(CommissionerError::Validation(format!(
                    "subtask run {}#{} already exists",
                    run.parent_id, run.position
                )));
            }
        }
        for run in runs {
            let siblings = inner.subtask_runs.entry(run.parent_id).or_default();
            siblings.push(run.clone());
            siblings.sort_by_key(|s| s.position);
        }
        Ok(())
    }

    async fn update_subtask_run(&self, run: &SubTaskRun) -> Result<()> {
        let mut inner = self.inner.write();
        let stored = inner
            .subtask_runs
            .get_mut(&run.parent_id)
            .and_then(|siblings| siblings.iter_mut().find(|s| s.position == run.position))
            .ok_or_else(|| {
                CommissionerError::not_found(
                    "subtask_run",
                    format!("{}#{}", run.parent_id, run.position),
                )
            })?;
        *stored = run.clone();
        Ok(())
    }

    async fn list_subtask_runs(&self, parent_id: Uuid) -> Result<Vec<SubTaskRun>> {
        Ok(self
            .inner
            .read()
            .subtask_runs
            .get(&parent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn cascade_delete_completed(&self, run_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.write();
        let Some(root) = inner.task_runs.get(&run_id) else {
            return Ok(0);
        };
        if !root.state.is_terminal() {
            return Ok(0);
        }

        let children = inner.subtask_runs.get(&run_id).map(Vec::as_slice).unwrap_or(&[]);
        if root.state == TaskRunState::Success && children.iter().any(|s| !s.state.is_terminal())
        {
            return Ok(0);
        }

        let removed_children = inner
            .subtask_runs
            .remove(&run_id)
            .map_or(0, |children| children.len() as u64);
        inner.task_runs.remove(&run_id);
        Ok(removed_children + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubTaskGroupType, TargetKind, TaskType, UniverseDefinition};
    use crate::state_machine::TaskRunEvent;

    fn task_run(target_id: Uuid) -> TaskRun {
        TaskRun::new(
            "AddNodeToUniverse",
            TaskType::Add,
            TargetKind::Node,
            target_id,
            "n1",
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn test_save_is_compare_and_swap() {
        let store = InMemoryStore::new();
        let universe = Universe::new("orders", UniverseDefinition::default());
        store.insert_universe(&universe).await.unwrap();

        assert_eq!(store.save_universe(&universe, 1).await.unwrap(), 2);

        let err = store.save_universe(&universe, 1).await.unwrap_err();
        assert!(err.is_retryable());

        let stored = store.find_universe(universe.id()).await.unwrap().unwrap();
        assert_eq!(stored.version(), 2);
    }

    #[tokio::test]
    async fn test_save_unknown_universe() {
        let store = InMemoryStore::new();
        let universe = Universe::new("ghost", UniverseDefinition::default());
        let err = store.save_universe(&universe, 1).await.unwrap_err();
        assert!(matches!(err, CommissionerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_terminal_run_is_immutable() {
        let store = InMemoryStore::new();
        let mut run = task_run(Uuid::new_v4());
        store.insert_task_run(&run).await.unwrap();

        run.transition(TaskRunEvent::Abort).unwrap();
        store.update_task_run(&run).await.unwrap();

        let err = store.update_task_run(&run).await.unwrap_err();
        assert!(matches!(err, CommissionerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_find_task_runs_pages_newest_first() {
        let store = InMemoryStore::new();
        let target = Uuid::new_v4();
        let mut ids = Vec::new();
        for offset in 0..3 {
            let mut run = task_run(target);
            run.created_at = Utc::now() + chrono::Duration::seconds(offset);
            ids.push(run.id);
            store.insert_task_run(&run).await.unwrap();
        }
        store.insert_task_run(&task_run(Uuid::new_v4())).await.unwrap();

        let page = store
            .find_task_runs(&TaskRunFilter {
                target_id: Some(target),
                offset: 1,
                limit: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), vec![ids[1], ids[0]]);
    }

    #[tokio::test]
    async fn test_subtask_rows_require_parent() {
        let store = InMemoryStore::new();
        let orphan = SubTaskRun::new(
            Uuid::new_v4(),
            0,
            "SetNodeState",
            0,
            SubTaskGroupType::ConfigureUniverse,
        );
        let err = store.insert_subtask_runs(&[orphan]).await.unwrap_err();
        assert!(matches!(err, CommissionerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_subtask_batch_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let parent = task_run(Uuid::new_v4());
        store.insert_task_run(&parent).await.unwrap();
        let row = |position| {
            SubTaskRun::new(
                parent.id,
                position,
                "SetNodeState",
                0,
                SubTaskGroupType::ConfigureUniverse,
            )
        };

        let err = store
            .insert_subtask_runs(&[row(0), row(1), row(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, CommissionerError::Validation(_)));
        assert!(store.list_subtask_runs(parent.id).await.unwrap().is_empty());

        store.insert_subtask_runs(&[row(0)]).await.unwrap();
        let err = store
            .insert_subtask_runs(&[row(1), row(0)])
            .await
            .unwrap_err();
        assert!(matches!(err, CommissionerError::Validation(_)));
        let stored = store.list_subtask_runs(parent.id).await.unwrap();
        assert_eq!(stored.iter().map(|s| s.position).collect::<Vec<_>>(), vec![0]);
    }
}
