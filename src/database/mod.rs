//! # Persistence
//!
//! Storage seams for the two durable aggregates: versioned universes and the
//! task-run audit trail. The engine only talks to the [`UniverseStore`] and
//! [`TaskRunStore`] traits; [`memory::InMemoryStore`] backs tests and embedded
//! use, [`postgres::PgStore`] backs production.
//!
//! ## Contracts
//!
//! - [`UniverseStore::save_universe`] is a compare-and-swap: it succeeds only when
//!   the stored version equals `expected_version`, and the stored version then
//!   becomes `expected_version + 1`. A lost race is
//!   [`crate::error::ConflictReason::VersionMismatch`].
//! - A terminal [`TaskRun`] is immutable. It can only leave the store through
//!   [`TaskRunStore::cascade_delete_completed`], which removes the run and all its
//!   subtask rows together or not at all.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{SubTaskRun, TaskRun, TaskRunFilter, Universe};

pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

#[async_trait]
pub trait UniverseStore: Send + Sync {
    async fn find_universe(&self, id: Uuid) -> Result<Option<Universe>>;

    async fn find_universes(&self) -> Result<Vec<Universe>>;

    async fn insert_universe(&self, universe: &Universe) -> Result<()>;

    /// Persist `universe`'s definition if the stored version is still
    /// `expected_version`. Returns the new version.
    async fn save_universe(&self, universe: &Universe, expected_version: i64) -> Result<i64>;
}

#[async_trait]
pub trait TaskRunStore: Send + Sync {
    async fn insert_task_run(&self, run: &TaskRun) -> Result<()>;

    /// Replace a stored run; rejected once the stored copy is terminal
    async fn update_task_run(&self, run: &TaskRun) -> Result<()>;

    async fn find_task_run(&self, id: Uuid) -> Result<Option<TaskRun>>;

    async fn find_task_runs(&self, filter: &TaskRunFilter) -> Result<Vec<TaskRun>>;

    async fn find_incomplete_by_target(&self, target_id: Uuid) -> Result<Vec<TaskRun>>;

    /// Terminal runs that completed strictly before `cutoff`
    async fn find_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TaskRun>>;

    async fn insert_subtask_runs(&self, runs: &[SubTaskRun]) -> Result<()>;

    async fn update_subtask_run(&self, run: &SubTaskRun) -> Result<()>;

    /// Subtask rows of a run, ordered by position
    async fn list_subtask_runs(&self, parent_id: Uuid) -> Result<Vec<SubTaskRun>>;

    /// Delete a completed run with all of its subtask rows in one transaction.
    ///
    /// Returns the number of rows removed (subtasks + 1), or 0 without touching
    /// anything when the run is missing, not terminal, or a successful run still
    /// has unfinished subtasks.
    async fn cascade_delete_completed(&self, run_id: Uuid) -> Result<u64>;
}
