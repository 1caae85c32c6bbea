//! PostgreSQL store.
//!
//! Uses the runtime query API so the crate builds without a live database.
//! Universe definitions live in a JSONB column; the compare-and-swap is a single
//! `UPDATE ... WHERE version = $expected`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{TaskRunStore, UniverseStore};
use crate::config::DatabaseConfig;
use crate::error::{CommissionerError, Result};
use crate::models::{SubTaskRun, TaskRun, TaskRunFilter, Universe, UniverseDefinition};
use crate::state_machine::TaskRunState;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const TERMINAL_STATES: [&str; 3] = ["success", "failure", "aborted"];

#[derive(Debug, FromRow)]
struct UniverseRow {
    id: Uuid,
    name: String,
    version: i64,
    definition: Json<UniverseDefinition>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UniverseRow> for Universe {
    fn from(row: UniverseRow) -> Self {
        Universe::restore(
            row.id,
            row.name,
            row.version,
            row.definition.0,
            row.created_at,
            row.updated_at,
        )
    }
}

#[derive(Debug, FromRow)]
struct TaskRunRow {
    id: Uuid,
    task_name: String,
    task_type: String,
    target_kind: String,
    target_id: Uuid,
    target_name: String,
    state: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    details: serde_json::Value,
    error_message: Option<String>,
}

impl TryFrom<TaskRunRow> for TaskRun {
    type Error = CommissionerError;

    fn try_from(row: TaskRunRow) -> Result<Self> {
        Ok(TaskRun {
            id: row.id,
            task_name: row.task_name,
            task_type: row.task_type.parse()?,
            target_kind: row.target_kind.parse()?,
            target_id: row.target_id,
            target_name: row.target_name,
            state: parse_state(&row.state)?,
            created_at: row.created_at,
            completed_at: row.completed_at,
            details: row.details,
            error_message: row.error_message,
        })
    }
}

#[derive(Debug, FromRow)]
struct SubTaskRunRow {
    parent_id: Uuid,
    position: i32,
    subtask_name: String,
    group_index: i32,
    group_type: String,
    state: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubTaskRunRow> for SubTaskRun {
    type Error = CommissionerError;

    fn try_from(row: SubTaskRunRow) -> Result<Self> {
        Ok(SubTaskRun {
            parent_id: row.parent_id,
            position: row.position,
            subtask_name: row.subtask_name,
            group_index: row.group_index,
            group_type: row.group_type.parse()?,
            state: parse_state(&row.state)?,
            error: row.error,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

fn parse_state(value: &str) -> Result<TaskRunState> {
    value.parse().map_err(CommissionerError::Database)
}

fn rows_into<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = CommissionerError>,
{
    rows.into_iter().map(T::try_from).collect()
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            CommissionerError::Configuration("database.url is not set".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect(url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "🗄️ Connected commissioner store"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| CommissionerError::Database(e.to_string()))?;
        debug!("Commissioner migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<bool> {
        let (health,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(health == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl UniverseStore for PgStore {
    async fn find_universe(&self, id: Uuid) -> Result<Option<Universe>> {
        let row = sqlx::query_as::<_, UniverseRow>(
            "SELECT id, name, version, definition, created_at, updated_at
             FROM universes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Universe::from))
    }

    async fn find_universes(&self) -> Result<Vec<Universe>> {
        let rows = sqlx::query_as::<_, UniverseRow>(
            "SELECT id, name, version, definition, created_at, updated_at
             FROM universes ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Universe::from).collect())
    }

    async fn insert_universe(&self, universe: &Universe) -> Result<()> {
        sqlx::query(
            "INSERT INTO universes (id, name, version, definition, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(universe.id())
        .bind(universe.name())
        .bind(universe.version())
        .bind(Json(universe.definition()))
        .bind(universe.created_at())
        .bind(universe.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_universe(&self, universe: &Universe, expected_version: i64) -> Result<i64> {
        let updated: Option<(i64,)> = sqlx::query_as(
            "UPDATE universes
             SET definition = $1, version = version + 1, updated_at = NOW()
             WHERE id = $2 AND version = $3
             RETURNING version",
        )
        .bind(Json(universe.definition()))
        .bind(universe.id())
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((new_version,)) = updated {
            return Ok(new_version);
        }

        let current: Option<(i64,)> = sqlx::query_as("SELECT version FROM universes WHERE id = $1")
            .bind(universe.id())
            .fetch_optional(&self.pool)
            .await?;

        match current {
            Some((found,)) => Err(CommissionerError::version_mismatch(
                universe.id(),
                expected_version,
                found,
            )),
            None => Err(CommissionerError::not_found("universe", universe.id())),
        }
    }
}

#[async_trait]
impl TaskRunStore for PgStore {
    async fn insert_task_run(&self, run: &TaskRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_runs (id, task_name, task_type, target_kind, target_id,
                                    target_name, state, created_at, completed_at,
                                    details, error_message)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(run.id)
        .bind(&run.task_name)
        .bind(run.task_type.as_str())
        .bind(run.target_kind.as_str())
        .bind(run.target_id)
        .bind(&run.target_name)
        .bind(run.state.as_str())
        .bind(run.created_at)
        .bind(run.completed_at)
        .bind(&run.details)
        .bind(&run.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_task_run(&self, run: &TaskRun) -> Result<()> {
        let result = sqlx::query(
            "UPDATE task_runs
             SET state = $2, completed_at = $3, details = $4, error_message = $5
             WHERE id = $1 AND state <> ALL($6)",
        )
        .bind(run.id)
        .bind(run.state.as_str())
        .bind(run.completed_at)
        .bind(&run.details)
        .bind(&run.error_message)
        .bind(&TERMINAL_STATES[..])
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.find_task_run(run.id).await? {
            Some(stored) => Err(CommissionerError::InvalidTransition {
                entity: "task_run".to_string(),
                from: stored.state.to_string(),
                to: run.state.to_string(),
            }),
            None => Err(CommissionerError::not_found("task_run", run.id)),
        }
    }

    async fn find_task_run(&self, id: Uuid) -> Result<Option<TaskRun>> {
        let row = sqlx::query_as::<_, TaskRunRow>("SELECT * FROM task_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TaskRun::try_from).transpose()
    }

    async fn find_task_runs(&self, filter: &TaskRunFilter) -> Result<Vec<TaskRun>> {
        let rows = sqlx::query_as::<_, TaskRunRow>(
            "SELECT * FROM task_runs
             WHERE ($1::uuid IS NULL OR target_id = $1)
               AND ($2::text IS NULL OR state = $2)
             ORDER BY created_at DESC
             OFFSET $3 LIMIT $4",
        )
        .bind(filter.target_id)
        .bind(filter.state.map(|s| s.as_str()))
        .bind(filter.offset as i64)
        .bind(filter.limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;
        rows_into(rows)
    }

    async fn find_incomplete_by_target(&self, target_id: Uuid) -> Result<Vec<TaskRun>> {
        let rows = sqlx::query_as::<_, TaskRunRow>(
            "SELECT * FROM task_runs
             WHERE target_id = $1 AND state <> ALL($2)
             ORDER BY created_at",
        )
        .bind(target_id)
        .bind(&TERMINAL_STATES[..])
        .fetch_all(&self.pool)
        .await?;
        rows_into(rows)
    }

    async fn find_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TaskRun>> {
        let rows = sqlx::query_as::<_, TaskRunRow>(
            "SELECT * FROM task_runs
             WHERE state = ANY($1) AND completed_at < $2
             ORDER BY completed_at",
        )
        .bind(&TERMINAL_STATES[..])
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows_into(rows)
    }

    async fn insert_subtask_runs(&self, runs: &[SubTaskRun]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for run in runs {
            sqlx::query(
                "INSERT INTO subtask_runs (parent_id, position, subtask_name, group_index,
                                           group_type, state, error, created_at, completed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(run.parent_id)
            .bind(run.position)
            .bind(&run.subtask_name)
            .bind(run.group_index)
            .bind(run.group_type.as_str())
            .bind(run.state.as_str())
            .bind(&run.error)
            .bind(run.created_at)
            .bind(run.completed_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_subtask_run(&self, run: &SubTaskRun) -> Result<()> {
        let result = sqlx::query(
            "UPDATE subtask_runs SET state = $3, error = $4, completed_at = $5
             WHERE parent_id = $1 AND position = $2",
        )
        .bind(run.parent_id)
        .bind(run.position)
        .bind(run.state.as_str())
        .bind(&run.error)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CommissionerError::not_found(
                "subtask_run",
                format!("{}#{}", run.parent_id, run.position),
            ));
        }
        Ok(())
    }

    async fn list_subtask_runs(&self, parent_id: Uuid) -> Result<Vec<SubTaskRun>> {
        let rows = sqlx::query_as::<_, SubTaskRunRow>(
            "SELECT * FROM subtask_runs WHERE parent_id = $1 ORDER BY position",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        rows_into(rows)
    }

    async fn cascade_delete_completed(&self, run_id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let root: Option<(String,)> =
            sqlx::query_as("SELECT state FROM task_runs WHERE id = $1 FOR UPDATE")
                .bind(run_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((state,)) = root else {
            return Ok(0);
        };
        let state = parse_state(&state)?;
        if !state.is_terminal() {
            return Ok(0);
        }

        if state == TaskRunState::Success {
            let (unfinished,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM subtask_runs WHERE parent_id = $1 AND state <> ALL($2)",
            )
            .bind(run_id)
            .bind(&TERMINAL_STATES[..])
            .fetch_one(&mut *tx)
            .await?;
            if unfinished > 0 {
                return Ok(0);
            }
        }

        let children = sqlx::query("DELETE FROM subtask_runs WHERE parent_id = $1")
            .bind(run_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let root = sqlx::query("DELETE FROM task_runs WHERE id = $1")
            .bind(run_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!(run_id = %run_id, rows = children + root, "Cascade deleted task run");
        Ok(children + root)
    }
}
