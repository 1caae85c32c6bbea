use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use super::node;
use crate::cluster::{MasterChange, RemoteResponse};
use crate::error::{CommissionerError, Result};
use crate::orchestration::subtask::{FailurePolicy, Subtask};
use crate::orchestration::task::TaskContext;

const OPERATION: &str = "ChangeMasterConfig";

/// Add a node's master to the quorum or remove it.
///
/// Under [`FailurePolicy::BestEffort`] a call that never reaches the leader is
/// logged and skipped. An error the leader reports always fails the subtask.
#[derive(Debug, Clone)]
pub struct ChangeMasterConfig {
    pub universe_id: Uuid,
    pub node_name: String,
    pub change: MasterChange,
    /// Address the peer by host/port instead of its uuid, for peers known to be dead
    pub use_host_port: bool,
    pub failure_policy: FailurePolicy,
}

impl ChangeMasterConfig {
    pub fn new(
        universe_id: Uuid,
        node_name: impl Into<String>,
        change: MasterChange,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            universe_id,
            node_name: node_name.into(),
            change,
            use_host_port: false,
            failure_policy,
        }
    }

    pub fn using_host_port(mut self) -> Self {
        self.use_host_port = true;
        self
    }
}

#[async_trait]
impl Subtask for ChangeMasterConfig {
    fn name(&self) -> &'static str {
        OPERATION
    }

    fn universe_id(&self) -> Uuid {
        self.universe_id
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let universe = ctx.find_universe(self.universe_id).await?;
        let target = node(&universe, &self.node_name)?;

        let Some(host) = target.private_ip.clone() else {
            if self.failure_policy == FailurePolicy::BestEffort {
                warn!(
                    universe_id = %self.universe_id,
                    node = %self.node_name,
                    "Skipping best-effort master change for node without an address"
                );
                return Ok(());
            }
            return Err(CommissionerError::Validation(format!(
                "node {} has no address for {OPERATION}",
                self.node_name
            )));
        };
        let port = target.master_rpc_port;

        info!(
            universe_id = %self.universe_id,
            node = %self.node_name,
            change = ?self.change,
            use_host_port = self.use_host_port,
            policy = ?self.failure_policy,
            "Changing master config"
        );

        let client = match ctx.cluster_client(&universe).await {
            Ok(client) => client,
            Err(e) => return self.failure_policy.handle(OPERATION, e),
        };

        let response = match client
            .change_master_config(&host, port, self.change, self.use_host_port)
            .await
        {
            Ok(response) => response,
            Err(e) => return self.failure_policy.handle(OPERATION, e),
        };

        response.into_result(OPERATION)?;
        Ok(())
    }
}
