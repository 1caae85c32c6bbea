//! # Subtask Groups
//!
//! A [`SubTaskGroupQueue`] is an ordered list of [`SubTaskGroup`]s. Groups run
//! strictly one after another; the subtasks of one group run concurrently on
//! the task's worker pool.
//!
//! ## Failure
//!
//! The first failing subtask stops its group: the queue stops waiting, marks
//! the group cancelled so members that have not started yet never start, and
//! returns the error without touching later groups. Members already running are
//! left to finish and record their own outcome. Completed groups are never
//! rolled back.
//!
//! ## Audit
//!
//! Every scheduled subtask gets a [`SubTaskRun`] row up front, numbered
//! across the whole queue. Rows that never start end up `Aborted`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info};

use super::subtask::Subtask;
use super::task::TaskContext;
use crate::error::{CommissionerError, Result};
use crate::logging::{log_error, log_subtask_operation};
use crate::models::{SubTaskGroupType, SubTaskRun};
use crate::state_machine::TaskRunEvent;

pub struct SubTaskGroup {
    name: String,
    group_type: SubTaskGroupType,
    subtasks: Vec<Arc<dyn Subtask>>,
}

impl SubTaskGroup {
    pub fn new(name: impl Into<String>, group_type: SubTaskGroupType) -> Self {
        Self {
            name: name.into(),
            group_type,
            subtasks: Vec::new(),
        }
    }

    pub fn add<S: Subtask + 'static>(&mut self, subtask: S) -> &mut Self {
        self.subtasks.push(Arc::new(subtask));
        self
    }

    pub fn with<S: Subtask + 'static>(mut self, subtask: S) -> Self {
        self.add(subtask);
        self
    }

    pub fn add_shared(&mut self, subtask: Arc<dyn Subtask>) -> &mut Self {
        self.subtasks.push(subtask);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_type(&self) -> SubTaskGroupType {
        self.group_type
    }

    pub fn len(&self) -> usize {
        self.subtasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }
}

#[derive(Default)]
pub struct SubTaskGroupQueue {
    groups: Vec<SubTaskGroup>,
}

impl SubTaskGroupQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, group: SubTaskGroup) -> &mut Self {
        self.groups.push(group);
        self
    }

    pub fn groups(&self) -> &[SubTaskGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total subtasks across all groups
    pub fn subtask_count(&self) -> usize {
        self.groups.iter().map(SubTaskGroup::len).sum()
    }

    pub async fn run(&self, ctx: &TaskContext) -> Result<()> {
        for subtask in self.groups.iter().flat_map(|g| g.subtasks.iter()) {
            if subtask.universe_id() != ctx.target_id() {
                return Err(CommissionerError::Validation(format!(
                    "subtask {} targets universe {} but the task runs against {}",
                    subtask.name(),
                    subtask.universe_id(),
                    ctx.target_id()
                )));
            }
        }

        let rows = self.audit_rows(ctx);
        let all_rows: Vec<SubTaskRun> = rows.iter().flatten().cloned().collect();
        ctx.task_runs().insert_subtask_runs(&all_rows).await?;

        info!(
            run_id = %ctx.run_id(),
            groups = self.groups.len(),
            subtasks = all_rows.len(),
            "📋 Running subtask group queue"
        );

        for (index, group) in self.groups.iter().enumerate() {
            if ctx.is_aborted() {
                abort_pending(ctx, &rows[index..]).await;
                return Err(CommissionerError::Aborted(ctx.run_id()));
            }
            if group.is_empty() {
                continue;
            }

            if let Err(e) = run_group(ctx, group, &rows[index]).await {
                log_error(
                    "subtask_group_queue",
                    group.name(),
                    &e.to_string(),
                    Some(&format!("run_id={} group_index={index}", ctx.run_id())),
                );
                abort_pending(ctx, &rows[index + 1..]).await;
                return Err(e);
            }
        }

        Ok(())
    }

    fn audit_rows(&self, ctx: &TaskContext) -> Vec<Vec<SubTaskRun>> {
        let mut position: i32 = 0;
        self.groups
            .iter()
            .enumerate()
            .map(|(group_index, group)| {
                group
                    .subtasks
                    .iter()
                    .map(|subtask| {
                        let row = SubTaskRun::new(
                            ctx.run_id(),
                            position,
                            subtask.name(),
                            group_index as i32,
                            group.group_type,
                        );
                        position += 1;
                        row
                    })
                    .collect()
            })
            .collect()
    }
}

async fn run_group(ctx: &TaskContext, group: &SubTaskGroup, rows: &[SubTaskRun]) -> Result<()> {
    debug!(
        run_id = %ctx.run_id(),
        group = %group.name,
        group_type = %group.group_type,
        size = group.subtasks.len(),
        "Starting subtask group"
    );

    let cancelled = Arc::new(AtomicBool::new(false));
    let mut pending = FuturesUnordered::new();
    for (subtask, row) in group.subtasks.iter().zip(rows) {
        pending.push(ctx.pool().spawn(run_subtask(
            ctx.clone(),
            Arc::clone(subtask),
            row.clone(),
            Arc::clone(&cancelled),
        )));
    }

    while let Some(joined) = pending.next().await {
        let outcome = joined
            .map_err(|e| CommissionerError::Internal(format!("subtask worker failed: {e}")))
            .and_then(|result| result);
        if let Err(e) = outcome {
            // Dropping `pending` detaches whatever is still running
            cancelled.store(true, Ordering::Release);
            return Err(e);
        }
    }

    debug!(run_id = %ctx.run_id(), group = %group.name, "Subtask group completed");
    Ok(())
}

async fn run_subtask(
    ctx: TaskContext,
    subtask: Arc<dyn Subtask>,
    mut row: SubTaskRun,
    cancelled: Arc<AtomicBool>,
) -> Result<()> {
    if cancelled.load(Ordering::Acquire) || ctx.is_aborted() {
        if row.transition(TaskRunEvent::Abort).is_ok() {
            persist_row(&ctx, &row).await;
        }
        return Err(CommissionerError::Aborted(ctx.run_id()));
    }

    row.transition(TaskRunEvent::Start)?;
    ctx.task_runs().update_subtask_run(&row).await?;
    log_subtask_operation("START", ctx.run_id(), row.position, subtask.name(), "running", None);

    let result = subtask.run(&ctx).await;

    let event = match &result {
        Ok(()) => TaskRunEvent::Succeed,
        Err(e) => TaskRunEvent::fail(e.to_string()),
    };
    row.transition(event)?;
    persist_row(&ctx, &row).await;
    log_subtask_operation(
        "FINISH",
        ctx.run_id(),
        row.position,
        subtask.name(),
        row.state.as_str(),
        row.error.as_deref(),
    );

    result
}

/// Final audit writes are logged on failure rather than masking the subtask's outcome
async fn persist_row(ctx: &TaskContext, row: &SubTaskRun) {
    if let Err(e) = ctx.task_runs().update_subtask_run(row).await {
        log_error(
            "subtask_group_queue",
            "update_subtask_run",
            &e.to_string(),
            Some(&format!("run_id={} position={}", row.parent_id, row.position)),
        );
    }
}

async fn abort_pending(ctx: &TaskContext, groups: &[Vec<SubTaskRun>]) {
    for row in groups.iter().flatten() {
        let mut row = row.clone();
        if row.transition(TaskRunEvent::Abort).is_ok() {
            persist_row(ctx, &row).await;
        }
    }
}
