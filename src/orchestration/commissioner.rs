//! # Commissioner
//!
//! Front door of the engine. [`Commissioner::submit`] persists a `Created`
//! [`TaskRun`], spawns the task and returns its run id straight away; callers
//! poll [`Commissioner::get_status`] for progress.
//!
//! ## Serialization
//!
//! At most one live run exists per universe. Submission is refused with a
//! conflict when the universe's `update_in_progress` flag is set or this
//! process already tracks a run against it. The flag itself is taken by the
//! task through the versioned updater, so a second process racing the first
//! still loses on the compare-and-swap.
//!
//! ## Abort
//!
//! [`Commissioner::abort`] raises the run's abort flag. Groups and subtasks that
//! have not started yet never start; whatever is running finishes on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::registry::{TaskKind, TaskParams, TaskRegistry};
use super::task::{CommissionerServices, Task, TaskContext};
use super::updater::mutate;
use crate::error::{CommissionerError, Result};
use crate::logging::{log_error, log_task_operation};
use crate::models::{TaskRun, TaskRunFilter};
use crate::state_machine::{TaskRunEvent, TaskRunState};

const ORPHANED_RUN_MESSAGE: &str = "commissioner restarted before the run completed";

/// Snapshot returned by [`Commissioner::get_status`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub run_id: Uuid,
    pub state: TaskRunState,
    /// Share of scheduled subtasks that succeeded, 100 once the run succeeded
    pub percent_complete: f64,
    pub error: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Runs owned by this process
#[derive(Default)]
struct RunTracker {
    aborts: DashMap<Uuid, Arc<AtomicBool>>,
    /// universe id -> run id
    targets: DashMap<Uuid, Uuid>,
}

impl RunTracker {
    fn reserve(&self, target_id: Uuid, run_id: Uuid) -> Result<()> {
        match self.targets.entry(target_id) {
            Entry::Occupied(_) => Err(CommissionerError::update_in_progress(target_id)),
            Entry::Vacant(slot) => {
                slot.insert(run_id);
                Ok(())
            }
        }
    }

    fn release(&self, target_id: Uuid, run_id: Uuid) {
        self.aborts.remove(&run_id);
        self.targets.remove_if(&target_id, |_, owner| *owner == run_id);
    }
}

/// Drops the run's reservation however its execution ends
struct Reservation {
    tracker: Arc<RunTracker>,
    target_id: Uuid,
    run_id: Uuid,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.tracker.release(self.target_id, self.run_id);
    }
}

pub struct Commissioner {
    services: CommissionerServices,
    registry: TaskRegistry,
    tracker: Arc<RunTracker>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Commissioner {
    pub fn new(services: CommissionerServices, registry: TaskRegistry) -> Self {
        Self {
            services,
            registry,
            tracker: Arc::new(RunTracker::default()),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn services(&self) -> &CommissionerServices {
        &self.services
    }

    /// Build a registered task kind and submit it
    pub async fn submit(&self, kind: TaskKind, params: TaskParams) -> Result<Uuid> {
        let task = self.registry.create(kind, params)?;
        self.submit_task(task).await
    }

    pub async fn submit_task(&self, task: Arc<dyn Task>) -> Result<Uuid> {
        let universe_id = task.universe_id();
        let universe = self
            .services
            .universes
            .find_universe(universe_id)
            .await?
            .ok_or_else(|| CommissionerError::not_found("universe", universe_id))?;

        if universe.is_update_in_progress() {
            warn!(
                universe_id = %universe_id,
                task_name = %task.name(),
                "Rejecting submission, universe update already in progress"
            );
            return Err(CommissionerError::update_in_progress(universe_id));
        }

        let run = TaskRun::new(
            task.name(),
            task.task_type(),
            task.target_kind(),
            universe_id,
            task.target_name(&universe),
            task.details(),
        );
        let run_id = run.id;

        self.tracker.reserve(universe_id, run_id)?;
        let reservation = Reservation {
            tracker: Arc::clone(&self.tracker),
            target_id: universe_id,
            run_id,
        };

        self.services.task_runs.insert_task_run(&run).await?;

        let ctx = TaskContext::new(run_id, universe_id, self.services.clone());
        self.tracker.aborts.insert(run_id, ctx.abort_handle());

        log_task_operation(
            "SUBMIT",
            run_id,
            task.name(),
            Some(universe_id),
            run.state.as_str(),
            Some(&run.friendly_description()),
        );

        let handle = tokio::spawn(execute(task, ctx, run, reservation));
        {
            let mut handles = self.handles.lock();
            handles.retain(|handle| !handle.is_finished());
            handles.push(handle);
        }

        Ok(run_id)
    }

    pub async fn get_status(&self, run_id: Uuid) -> Result<TaskStatus> {
        let run = self
            .services
            .task_runs
            .find_task_run(run_id)
            .await?
            .ok_or_else(|| CommissionerError::not_found("task run", run_id))?;

        let percent_complete = if run.state == TaskRunState::Success {
            100.0
        } else {
            let rows = self.services.task_runs.list_subtask_runs(run_id).await?;
            if rows.is_empty() {
                0.0
            } else {
                let done = rows
                    .iter()
                    .filter(|row| row.state == TaskRunState::Success)
                    .count();
                done as f64 * 100.0 / rows.len() as f64
            }
        };

        Ok(TaskStatus {
            run_id,
            state: run.state,
            percent_complete,
            error: run.error_message.clone(),
            description: run.friendly_description(),
            created_at: run.created_at,
            completed_at: run.completed_at,
        })
    }

    /// Request an abort. `false` when the run exists but is not live here.
    pub async fn abort(&self, run_id: Uuid) -> Result<bool> {
        if let Some(flag) = self.tracker.aborts.get(&run_id) {
            flag.store(true, Ordering::Release);
            info!(run_id = %run_id, "🛑 Abort requested");
            return Ok(true);
        }

        match self.services.task_runs.find_task_run(run_id).await? {
            Some(run) => {
                warn!(
                    run_id = %run_id,
                    state = %run.state,
                    "Abort ignored, run is not executing in this process"
                );
                Ok(false)
            }
            None => Err(CommissionerError::not_found("task run", run_id)),
        }
    }

    pub fn is_live(&self, run_id: Uuid) -> bool {
        self.tracker.aborts.contains_key(&run_id)
    }

    pub fn live_runs(&self) -> usize {
        self.tracker.aborts.len()
    }

    pub async fn find_history(&self, filter: &TaskRunFilter) -> Result<Vec<TaskRun>> {
        self.services.task_runs.find_task_runs(filter).await
    }

    /// Remove terminal runs older than `cutoff` with their subtask rows.
    /// Returns the number of audit rows deleted.
    pub async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let candidates = self.services.task_runs.find_completed_before(cutoff).await?;
        let mut deleted = 0;
        for run in &candidates {
            deleted += self
                .services
                .task_runs
                .cascade_delete_completed(run.id)
                .await?;
        }

        info!(
            cutoff = %cutoff,
            runs = candidates.len(),
            rows_deleted = deleted,
            "🧹 Deleted completed task runs"
        );
        Ok(deleted)
    }

    /// Fail runs left `Created` or `Running` by a previous process and release
    /// the universe flags they held. Returns the number of runs failed.
    pub async fn fail_orphaned_runs(&self) -> Result<usize> {
        let mut orphans = Vec::new();
        for state in [TaskRunState::Created, TaskRunState::Running] {
            let filter = TaskRunFilter {
                state: Some(state),
                ..Default::default()
            };
            orphans.extend(self.services.task_runs.find_task_runs(&filter).await?);
        }

        let mut failed = 0;
        for mut run in orphans {
            if self.is_live(run.id) {
                continue;
            }
            run.transition(TaskRunEvent::fail(ORPHANED_RUN_MESSAGE))?;
            self.services.task_runs.update_task_run(&run).await?;
            failed += 1;

            let universe = self.services.universes.find_universe(run.target_id).await?;
            let holds_flag = universe.is_some_and(|u| u.is_update_in_progress());
            if holds_flag && !self.tracker.targets.contains_key(&run.target_id) {
                mutate(self.services.universes.as_ref(), run.target_id, |definition| {
                    definition.update_in_progress = false;
                    Ok(())
                })
                .await?;
            }

            log_task_operation(
                "RECOVER",
                run.id,
                &run.task_name,
                Some(run.target_id),
                run.state.as_str(),
                Some(ORPHANED_RUN_MESSAGE),
            );
        }
        Ok(failed)
    }

    /// Wait for live runs up to the configured shutdown timeout, then raise
    /// the abort flag of whatever is left. Returns the number of runs still
    /// executing.
    pub async fn shutdown(&self) -> usize {
        let handles = std::mem::take(&mut *self.handles.lock());
        let timeout = Duration::from_millis(self.services.config.executor.shutdown_timeout_ms);
        info!(
            live_runs = self.live_runs(),
            timeout_ms = timeout.as_millis() as u64,
            "🛑 Shutting down commissioner"
        );

        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            for entry in self.tracker.aborts.iter() {
                entry.value().store(true, Ordering::Release);
            }
            warn!(
                live_runs = self.live_runs(),
                "Shutdown timeout exceeded, remaining runs aborted"
            );
        }
        self.live_runs()
    }
}

async fn execute(task: Arc<dyn Task>, ctx: TaskContext, mut run: TaskRun, reservation: Reservation) {
    let run_id = run.id;
    let universe_id = ctx.target_id();

    let event = if ctx.is_aborted() {
        TaskRunEvent::Abort
    } else {
        match start(&ctx, &mut run).await {
            Ok(()) => {
                log_task_operation(
                    "START",
                    run_id,
                    task.name(),
                    Some(universe_id),
                    run.state.as_str(),
                    None,
                );
                match task.run(&ctx).await {
                    Ok(()) => TaskRunEvent::Succeed,
                    Err(CommissionerError::Aborted(_)) => TaskRunEvent::Abort,
                    Err(e) => TaskRunEvent::fail(e.to_string()),
                }
            }
            Err(e) => TaskRunEvent::fail(e.to_string()),
        }
    };

    match run.transition(event) {
        Ok(_) => {
            if let Err(e) = ctx.task_runs().update_task_run(&run).await {
                log_error(
                    "commissioner",
                    "update_task_run",
                    &e.to_string(),
                    Some(&format!("run_id={run_id}")),
                );
            }
        }
        Err(e) => log_error(
            "commissioner",
            "finish_task_run",
            &e.to_string(),
            Some(&format!("run_id={run_id}")),
        ),
    }

    log_task_operation(
        "FINISH",
        run_id,
        task.name(),
        Some(universe_id),
        run.state.as_str(),
        run.error_message.as_deref(),
    );

    if run.state == TaskRunState::Failure
        && task.should_send_notification(&ctx.config().notification, &run)
    {
        if let Err(e) = task.send_notification(&ctx, &run).await {
            log_error(
                "commissioner",
                "send_notification",
                &e.to_string(),
                Some(&format!("run_id={run_id}")),
            );
        }
    }

    drop(reservation);
}

async fn start(ctx: &TaskContext, run: &mut TaskRun) -> Result<()> {
    run.transition(TaskRunEvent::Start)?;
    ctx.task_runs().update_task_run(run).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_allows_one_run_per_target() {
        let tracker = RunTracker::default();
        let target = Uuid::new_v4();
        let first = Uuid::new_v4();

        tracker.reserve(target, first).unwrap();
        let err = tracker.reserve(target, Uuid::new_v4()).unwrap_err();
        assert!(err.is_conflict());

        tracker.release(target, first);
        assert!(tracker.reserve(target, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_release_ignores_foreign_run() {
        let tracker = RunTracker::default();
        let target = Uuid::new_v4();
        let owner = Uuid::new_v4();

        tracker.reserve(target, owner).unwrap();
        tracker.release(target, Uuid::new_v4());
        assert_eq!(tracker.targets.get(&target).map(|r| *r), Some(owner));
    }
}
