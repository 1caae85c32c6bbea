use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use super::params_details;
use crate::cluster::{MasterChange, RemoteResponse};
use crate::error::{CommissionerError, Result};
use crate::models::{NodeDetails, NodeState, ServerType, SubTaskGroupType, TargetKind, TaskType, Universe};
use crate::orchestration::registry::{NodeTaskParams, TaskKind};
use crate::orchestration::subtask::FailurePolicy;
use crate::orchestration::subtask_group::{SubTaskGroup, SubTaskGroupQueue};
use crate::orchestration::subtasks::{
    ChangeMasterConfig, MarkUniverseUpdateSuccess, SetNodeState, UpdateNodeProcess,
    WaitForDataMove,
};
use crate::orchestration::task::{Task, TaskContext};
use crate::orchestration::universe_task::UniverseTaskBase;

const KIND: TaskKind = TaskKind::RemoveNodeFromUniverse;

/// Whether the node's master process answers a readiness check. Any failure
/// to ask counts as unreachable.
async fn is_master_alive(ctx: &TaskContext, universe: &Universe, node: &NodeDetails) -> bool {
    let Some(host_port) = node.host_port(ServerType::Master) else {
        return false;
    };
    let client = match ctx.cluster_client(universe).await {
        Ok(client) => client,
        Err(e) => {
            warn!(universe_id = %universe.id(), error = %e, "Cannot reach cluster to check master");
            return false;
        }
    };
    match client.is_server_ready(&host_port, ServerType::Master).await {
        Ok(response) => !response.has_error(),
        Err(e) => {
            warn!(
                universe_id = %universe.id(),
                node = %node.node_name,
                error = %e,
                "Master did not answer readiness check"
            );
            false
        }
    }
}

/// Take a running node out of its universe, draining its data first.
pub struct RemoveNodeFromUniverse {
    params: NodeTaskParams,
}

impl RemoveNodeFromUniverse {
    pub fn new(params: NodeTaskParams) -> Self {
        Self { params }
    }

    /// `master_reachable` picks how the node leaves the quorum: a live master
    /// is removed by its uuid and must succeed, a dead one is dropped by host
    /// and port on a best-effort basis.
    pub fn plan(&self, universe: &Universe, master_reachable: bool) -> Result<SubTaskGroupQueue> {
        let universe_id = universe.id();
        let node_name = self.params.node_name.as_str();
        let node = universe
            .node(node_name)
            .ok_or_else(|| CommissionerError::not_found("node", node_name))?;

        if node.state != NodeState::Running {
            return Err(CommissionerError::Validation(format!(
                "node {node_name} is {} and cannot be removed",
                node.state
            )));
        }

        let mut queue = SubTaskGroupQueue::new();
        queue.add(
            SubTaskGroup::new("SetNodeStateRemoving", SubTaskGroupType::ConfigureUniverse)
                .with(SetNodeState::new(universe_id, node_name, NodeState::Removing)),
        );

        if node.is_master {
            let change = ChangeMasterConfig::new(
                universe_id,
                node_name,
                MasterChange::RemoveMaster,
                if master_reachable {
                    FailurePolicy::Fatal
                } else {
                    FailurePolicy::BestEffort
                },
            );
            let change = if master_reachable {
                change
            } else {
                change.using_host_port()
            };
            queue
                .add(
                    SubTaskGroup::new(
                        "RemoveMasterFromQuorum",
                        SubTaskGroupType::UpdatingMasterConfig,
                    )
                    .with(change),
                )
                .add(
                    SubTaskGroup::new("StopMaster", SubTaskGroupType::RemovingUnusedServers).with(
                        UpdateNodeProcess::new(universe_id, node_name, ServerType::Master, false),
                    ),
                );
        }

        queue
            .add(
                SubTaskGroup::new("WaitForDataMove", SubTaskGroupType::WaitForDataMigration)
                    .with(WaitForDataMove::new(universe_id)),
            )
            .add(
                SubTaskGroup::new("StopTServer", SubTaskGroupType::RemovingUnusedServers).with(
                    UpdateNodeProcess::new(universe_id, node_name, ServerType::TServer, false),
                ),
            )
            .add(
                SubTaskGroup::new("SetNodeStateRemoved", SubTaskGroupType::ConfigureUniverse)
                    .with(SetNodeState::new(universe_id, node_name, NodeState::Removed)),
            )
            .add(
                SubTaskGroup::new("MarkUpdateSuccess", SubTaskGroupType::ConfigureUniverse)
                    .with(MarkUniverseUpdateSuccess::new(universe_id)),
            );

        info!(
            universe_id = %universe_id,
            node = %node_name,
            was_master = node.is_master,
            master_reachable,
            groups = queue.len(),
            "Planned node removal"
        );
        Ok(queue)
    }
}

#[async_trait]
impl Task for RemoveNodeFromUniverse {
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

    fn target_name(&self, _universe: &Universe) -> String {
        self.params.node_name.clone()
    }

    fn details(&self) -> serde_json::Value {
        params_details(KIND.name(), &self.params)
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let universe = ctx.find_universe(self.params.universe_id).await?;
        let master_reachable = match universe.node(&self.params.node_name) {
            Some(node) if node.is_master => is_master_alive(ctx, &universe, node).await,
            _ => false,
        };

        UniverseTaskBase::run_locked_for_node(
            ctx,
            self.params.universe_id,
            self.params.expected_universe_version,
            &self.params.node_name,
            |universe| self.plan(universe, master_reachable),
        )
        .await
    }
}
