//! # Task Contract
//!
//! A task turns one operator intent into a [`SubTaskGroupQueue`](super::SubTaskGroupQueue)
//! and drives it. The [`TaskContext`] it runs with carries the shared services,
//! the task's own bounded worker pool, its run id and its abort flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::worker_pool::TaskWorkerPool;
use crate::cluster::{ClusterClientFactory, ClusterClientGuard};
use crate::config::{CommissionerConfig, NotificationConfig};
use crate::database::{TaskRunStore, UniverseStore};
use crate::encryption::{DisabledKeyProvider, KeyMaterialCache, KeyMaterialProvider};
use crate::error::{CommissionerError, Result};
use crate::models::{TargetKind, TaskRun, TaskType, Universe};
use crate::notification::{
    should_report_failure, FailureNotification, LoggingNotifier, Notifier, TASK_FAILURE_ALERT,
};

/// Collaborators shared by every task the commissioner runs
#[derive(Clone)]
pub struct CommissionerServices {
    pub universes: Arc<dyn UniverseStore>,
    pub task_runs: Arc<dyn TaskRunStore>,
    pub cluster: Arc<dyn ClusterClientFactory>,
    pub notifier: Arc<dyn Notifier>,
    pub key_cache: Arc<KeyMaterialCache>,
    pub key_provider: Arc<dyn KeyMaterialProvider>,
    pub config: Arc<CommissionerConfig>,
}

impl CommissionerServices {
    pub fn new(
        universes: Arc<dyn UniverseStore>,
        task_runs: Arc<dyn TaskRunStore>,
        cluster: Arc<dyn ClusterClientFactory>,
        config: CommissionerConfig,
    ) -> Self {
        Self {
            universes,
            task_runs,
            cluster,
            notifier: Arc::new(LoggingNotifier),
            key_cache: Arc::new(KeyMaterialCache::new()),
            key_provider: Arc::new(DisabledKeyProvider),
            config: Arc::new(config),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_key_provider(mut self, provider: Arc<dyn KeyMaterialProvider>) -> Self {
        self.key_provider = provider;
        self
    }

    pub fn with_key_cache(mut self, cache: Arc<KeyMaterialCache>) -> Self {
        self.key_cache = cache;
        self
    }
}

/// Everything a running task and its subtasks can reach
#[derive(Clone)]
pub struct TaskContext {
    run_id: Uuid,
    target_id: Uuid,
    services: CommissionerServices,
    pool: TaskWorkerPool,
    abort_requested: Arc<AtomicBool>,
}

impl TaskContext {
    pub fn new(run_id: Uuid, target_id: Uuid, services: CommissionerServices) -> Self {
        let pool = TaskWorkerPool::new(services.config.executor.task_threads);
        Self {
            run_id,
            target_id,
            services,
            pool,
            abort_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Universe this run is serialized against
    pub fn target_id(&self) -> Uuid {
        self.target_id
    }

    pub fn services(&self) -> &CommissionerServices {
        &self.services
    }

    pub fn universes(&self) -> &dyn UniverseStore {
        self.services.universes.as_ref()
    }

    pub fn task_runs(&self) -> &dyn TaskRunStore {
        self.services.task_runs.as_ref()
    }

    pub fn config(&self) -> &CommissionerConfig {
        &self.services.config
    }

    pub fn pool(&self) -> &TaskWorkerPool {
        &self.pool
    }

    pub async fn find_universe(&self, universe_id: Uuid) -> Result<Universe> {
        self.universes()
            .find_universe(universe_id)
            .await?
            .ok_or_else(|| CommissionerError::not_found("universe", universe_id))
    }

    /// Client for the universe's masters, released when the guard drops
    pub async fn cluster_client(&self, universe: &Universe) -> Result<ClusterClientGuard> {
        ClusterClientGuard::acquire(
            Arc::clone(&self.services.cluster),
            &universe.master_addresses(),
            universe.certificate(),
        )
        .await
    }

    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort_requested)
    }

    pub fn request_abort(&self) {
        self.abort_requested.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_requested.load(Ordering::Acquire)
    }
}

#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    fn task_type(&self) -> TaskType;

    fn target_kind(&self) -> TargetKind;

    /// Universe the task mutates; at most one live run per universe
    fn universe_id(&self) -> Uuid;

    fn target_name(&self, universe: &Universe) -> String {
        universe.name().to_string()
    }

    /// Serialized parameters kept in the run's detail blob
    fn details(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()>;

    fn should_send_notification(&self, config: &NotificationConfig, run: &TaskRun) -> bool {
        should_report_failure(config, run)
    }

    async fn send_notification(&self, ctx: &TaskContext, run: &TaskRun) -> Result<()> {
        let payload = FailureNotification::from_run(run).template_data()?;
        let destinations = ctx.config().notification.destinations();
        ctx.services()
            .notifier
            .send(TASK_FAILURE_ALERT, &destinations, &payload)
            .await
    }
}
