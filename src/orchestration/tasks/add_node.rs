use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::params_details;
use crate::cluster::MasterChange;
use crate::error::{CommissionerError, Result};
use crate::models::{NodeState, ServerType, SubTaskGroupType, TargetKind, TaskType, Universe};
use crate::orchestration::registry::{NodeTaskParams, TaskKind};
use crate::orchestration::subtask::FailurePolicy;
use crate::orchestration::subtask_group::{SubTaskGroup, SubTaskGroupQueue};
use crate::orchestration::subtasks::{
    ChangeMasterConfig, MarkUniverseUpdateSuccess, SetNodeState, UpdateNodeProcess,
    WaitForLoadBalance, WaitForServerReady,
};
use crate::orchestration::task::{Task, TaskContext};
use crate::orchestration::universe_task::UniverseTaskBase;

const KIND: TaskKind = TaskKind::AddNodeToUniverse;

/// Bring a removed or decommissioned node back into its universe.
///
/// The node also gets a master process when the universe is short of masters.
/// A decommissioned node has lost its address, so re-adding one needs the
/// address of its new instance in [`NodeTaskParams::private_ip`].
pub struct AddNodeToUniverse {
    params: NodeTaskParams,
}

impl AddNodeToUniverse {
    pub fn new(params: NodeTaskParams) -> Self {
        Self { params }
    }

    pub fn plan(&self, universe: &Universe) -> Result<SubTaskGroupQueue> {
        let universe_id = universe.id();
        let node_name = self.params.node_name.as_str();
        let node = universe
            .node(node_name)
            .ok_or_else(|| CommissionerError::not_found("node", node_name))?;

        if !node.state.is_addable() {
            return Err(CommissionerError::Validation(format!(
                "node {node_name} is {} and cannot be added",
                node.state
            )));
        }
        let mut set_adding = SetNodeState::new(universe_id, node_name, NodeState::Adding);
        match (&node.private_ip, &self.params.private_ip) {
            (_, Some(ip)) => set_adding = set_adding.with_private_ip(ip.clone()),
            (Some(_), None) => {}
            (None, None) => {
                return Err(CommissionerError::Validation(format!(
                    "node {node_name} has no address, provision it before adding"
                )));
            }
        }
        let add_master = universe.definition().are_masters_under_replicated();

        let mut queue = SubTaskGroupQueue::new();
        queue.add(
            SubTaskGroup::new("SetNodeStateAdding", SubTaskGroupType::ConfigureUniverse)
                .with(set_adding),
        );

        if add_master {
            queue
                .add(
                    SubTaskGroup::new("StartMaster", SubTaskGroupType::StartingNodeProcesses)
                        .with(UpdateNodeProcess::new(
                            universe_id,
                            node_name,
                            ServerType::Master,
                            true,
                        )),
                )
                .add(
                    SubTaskGroup::new("WaitForMaster", SubTaskGroupType::WaitingForServers)
                        .with(WaitForServerReady::new(universe_id, node_name, ServerType::Master)),
                )
                .add(
                    SubTaskGroup::new("AddMasterToQuorum", SubTaskGroupType::UpdatingMasterConfig)
                        .with(ChangeMasterConfig::new(
                            universe_id,
                            node_name,
                            MasterChange::AddMaster,
                            FailurePolicy::Fatal,
                        )),
                );
        }

        queue
            .add(
                SubTaskGroup::new("StartTServer", SubTaskGroupType::StartingNodeProcesses).with(
                    UpdateNodeProcess::new(universe_id, node_name, ServerType::TServer, true),
                ),
            )
            .add(
                SubTaskGroup::new("WaitForTServer", SubTaskGroupType::WaitingForServers)
                    .with(WaitForServerReady::new(universe_id, node_name, ServerType::TServer)),
            )
            .add(
                SubTaskGroup::new("WaitForLoadBalance", SubTaskGroupType::WaitForLoadBalance)
                    .with(WaitForLoadBalance::new(universe_id)),
            )
            .add(
                SubTaskGroup::new("SetNodeStateRunning", SubTaskGroupType::ConfigureUniverse)
                    .with(SetNodeState::new(universe_id, node_name, NodeState::Running)),
            )
            .add(
                SubTaskGroup::new("MarkUpdateSuccess", SubTaskGroupType::ConfigureUniverse)
                    .with(MarkUniverseUpdateSuccess::new(universe_id)),
            );

        info!(
            universe_id = %universe_id,
            node = %node_name,
            add_master = add_master,
            groups = queue.len(),
            "Planned node addition"
        );
        Ok(queue)
    }
}

#[async_trait]
impl Task for AddNodeToUniverse {
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
        UniverseTaskBase::run_locked_for_node(
            ctx,
            self.params.universe_id,
            self.params.expected_universe_version,
            &self.params.node_name,
            |universe| self.plan(universe),
        )
        .await
    }
}
