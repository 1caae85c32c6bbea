//! # Universe Locking
//!
//! Tasks that need a universe to themselves take its `update_in_progress` flag
//! in one versioned mutation, run their queue, and clear it in another. A set
//! flag means someone else owns the universe: that is a non-retryable conflict.
//!
//! Node tasks also remember the node's state at lock time. If the run fails
//! the node is moved back to it before the unlock so the task can be retried.

use tracing::{info, warn};
use uuid::Uuid;

use super::subtask_group::SubTaskGroupQueue;
use super::task::TaskContext;
use super::updater::{mutate, mutate_at};
use crate::error::{CommissionerError, Result};
use crate::models::{NodeState, Universe};

/// `None` skips the check
pub fn check_universe_version(universe: &Universe, expected: Option<i64>) -> Result<()> {
    match expected {
        Some(expected) if expected != universe.version() => Err(
            CommissionerError::version_mismatch(universe.id(), expected, universe.version()),
        ),
        _ => Ok(()),
    }
}

pub async fn lock_universe_for_update(
    ctx: &TaskContext,
    universe_id: Uuid,
    expected_version: Option<i64>,
) -> Result<Universe> {
    let locked = mutate_at(ctx.universes(), universe_id, expected_version, |definition| {
        if definition.update_in_progress {
            return Err(CommissionerError::update_in_progress(universe_id));
        }
        definition.update_in_progress = true;
        definition.update_succeeded = false;
        Ok(())
    })
    .await?;

    info!(
        run_id = %ctx.run_id(),
        universe_id = %universe_id,
        version = locked.version(),
        "🔒 Locked universe for update"
    );
    Ok(locked)
}

pub async fn unlock_universe_for_update(ctx: &TaskContext, universe_id: Uuid) -> Result<Universe> {
    let unlocked = mutate(ctx.universes(), universe_id, |definition| {
        definition.update_in_progress = false;
        Ok(())
    })
    .await?;

    info!(
        run_id = %ctx.run_id(),
        universe_id = %universe_id,
        version = unlocked.version(),
        succeeded = unlocked.definition().update_succeeded,
        "🔓 Unlocked universe"
    );
    Ok(unlocked)
}

/// Put a node back into `state` after a failed run. Skips the write when the
/// node is already there; a node past the point of no return is left alone
/// and reported as an invalid transition.
pub async fn restore_node_state(
    ctx: &TaskContext,
    universe_id: Uuid,
    node_name: &str,
    state: NodeState,
) -> Result<()> {
    let current = ctx.find_universe(universe_id).await?;
    let from = current
        .node(node_name)
        .map(|node| node.state)
        .ok_or_else(|| CommissionerError::not_found("node", node_name))?;
    if from == state {
        return Ok(());
    }

    let restored = mutate(ctx.universes(), universe_id, |definition| {
        definition
            .node_mut(node_name)
            .ok_or_else(|| CommissionerError::not_found("node", node_name))?
            .apply_state(state)
    })
    .await?;

    info!(
        run_id = %ctx.run_id(),
        universe_id = %universe_id,
        node = %node_name,
        from = %from,
        to = %state,
        version = restored.version(),
        "↩️ Restored node state after failed run"
    );
    Ok(())
}

/// Shared driver for tasks that hold the universe lock for their whole run
pub struct UniverseTaskBase;

impl UniverseTaskBase {
    /// Lock, plan against the locked universe, run the plan, unlock.
    ///
    /// The unlock runs whatever the plan or the queue returned, but only if the
    /// lock was taken here. When both the run and the unlock fail the run's
    /// error is returned.
    pub async fn run_locked<F>(
        ctx: &TaskContext,
        universe_id: Uuid,
        expected_version: Option<i64>,
        plan: F,
    ) -> Result<()>
    where
        F: FnOnce(&Universe) -> Result<SubTaskGroupQueue> + Send,
    {
        Self::run_with_lock(ctx, universe_id, expected_version, None, plan).await
    }

    /// [`Self::run_locked`] for a task that owns one node. A failed run puts
    /// the node back into the state it had when the lock was taken.
    pub async fn run_locked_for_node<F>(
        ctx: &TaskContext,
        universe_id: Uuid,
        expected_version: Option<i64>,
        node_name: &str,
        plan: F,
    ) -> Result<()>
    where
        F: FnOnce(&Universe) -> Result<SubTaskGroupQueue> + Send,
    {
        Self::run_with_lock(ctx, universe_id, expected_version, Some(node_name), plan).await
    }

    async fn run_with_lock<F>(
        ctx: &TaskContext,
        universe_id: Uuid,
        expected_version: Option<i64>,
        node_name: Option<&str>,
        plan: F,
    ) -> Result<()>
    where
        F: FnOnce(&Universe) -> Result<SubTaskGroupQueue> + Send,
    {
        let locked = lock_universe_for_update(ctx, universe_id, expected_version).await?;
        let prior = node_name
            .and_then(|name| locked.node(name).map(|node| (name, node.state)));

        let outcome = match plan(&locked) {
            Ok(queue) => queue.run(ctx).await,
            Err(e) => Err(e),
        };

        if let (Err(run_error), Some((name, state))) = (&outcome, prior) {
            if let Err(restore_error) = restore_node_state(ctx, universe_id, name, state).await {
                warn!(
                    run_id = %ctx.run_id(),
                    universe_id = %universe_id,
                    node = %name,
                    run_error = %run_error,
                    error = %restore_error,
                    "Failed to restore node state after failed run"
                );
            }
        }

        let unlocked = unlock_universe_for_update(ctx, universe_id).await;
        match (outcome, unlocked) {
            (Ok(()), Ok(_)) => Ok(()),
            (Ok(()), Err(unlock_error)) => Err(unlock_error),
            (Err(run_error), Ok(_)) => Err(run_error),
            (Err(run_error), Err(unlock_error)) => {
                warn!(
                    run_id = %ctx.run_id(),
                    universe_id = %universe_id,
                    error = %unlock_error,
                    "Failed to unlock universe after failed run"
                );
                Err(run_error)
            }
        }
    }
}
