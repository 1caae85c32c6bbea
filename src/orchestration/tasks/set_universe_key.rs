use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::params_details;
use crate::encryption::{hex, ActiveKey};
use crate::error::{CommissionerError, Result};
use crate::models::{ServerType, SubTaskGroupType, TargetKind, TaskType, Universe};
use crate::orchestration::registry::{EncryptionKeyParams, TaskKind};
use crate::orchestration::subtask_group::{SubTaskGroup, SubTaskGroupQueue};
use crate::orchestration::subtasks::{DistributeUniverseKey, MarkUniverseUpdateSuccess};
use crate::orchestration::task::{Task, TaskContext};
use crate::orchestration::universe_task::UniverseTaskBase;

const KIND: TaskKind = TaskKind::SetUniverseKey;

/// Distribute a rotated universe key to every master.
///
/// Cached material of the universe is dropped first so the new key is resolved
/// from the provider.
pub struct SetUniverseKey {
    params: EncryptionKeyParams,
}

impl SetUniverseKey {
    pub fn new(params: EncryptionKeyParams) -> Self {
        Self { params }
    }

    pub fn plan(&self, universe: &Universe, key: &ActiveKey) -> Result<SubTaskGroupQueue> {
        let universe_id = universe.id();
        let mut distribute =
            SubTaskGroup::new("DistributeUniverseKey", SubTaskGroupType::SettingEncryptionKey);
        for master in universe.definition().masters() {
            if master.host_port(ServerType::Master).is_some() {
                distribute.add(DistributeUniverseKey::new(
                    universe_id,
                    master.node_name.clone(),
                    key.clone(),
                ));
            }
        }
        if distribute.is_empty() {
            return Err(CommissionerError::Validation(format!(
                "universe {} has no reachable masters",
                universe.name()
            )));
        }

        let mut queue = SubTaskGroupQueue::new();
        queue.add(distribute).add(
            SubTaskGroup::new("MarkUpdateSuccess", SubTaskGroupType::ConfigureUniverse)
                .with(MarkUniverseUpdateSuccess::new(universe_id)),
        );
        Ok(queue)
    }
}

#[async_trait]
impl Task for SetUniverseKey {
    fn name(&self) -> &str {
        KIND.name()
    }

    fn task_type(&self) -> TaskType {
        KIND.task_type()
    }

    fn target_kind(&self) -> TargetKind {
        KIND.target_kind()
    }

    fn universe_id(&self) -> Uuid {
        self.params.universe_id
    }

    fn details(&self) -> serde_json::Value {
        params_details(KIND.name(), &self.params)
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let universe_id = self.params.universe_id;
        let services = ctx.services();

        let dropped = services.key_cache.invalidate(universe_id);
        let key = services
            .key_provider
            .active_key(universe_id)
            .await?
            .ok_or_else(|| {
                CommissionerError::Validation(format!(
                    "universe {universe_id} has no active encryption key"
                ))
            })?;
        if key.config_id != self.params.kms_config_id {
            return Err(CommissionerError::Validation(format!(
                "active key of universe {universe_id} belongs to KMS config {}, not {}",
                key.config_id, self.params.kms_config_id
            )));
        }

        info!(
            universe_id = %universe_id,
            key_ref = %hex(&key.key_ref),
            dropped_cache_entries = dropped,
            "🔑 Setting universe key"
        );

        UniverseTaskBase::run_locked(
            ctx,
            universe_id,
            self.params.expected_universe_version,
            |universe| self.plan(universe, &key),
        )
        .await
    }
}
