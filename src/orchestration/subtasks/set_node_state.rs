use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::node_mut;
use crate::error::Result;
use crate::models::NodeState;
use crate::orchestration::subtask::Subtask;
use crate::orchestration::task::TaskContext;
use crate::orchestration::updater::mutate;

/// Move one node to a new state, rejecting transitions the state table forbids
#[derive(Debug, Clone)]
pub struct SetNodeState {
    pub universe_id: Uuid,
    pub node_name: String,
    pub state: NodeState,
    /// Address of a re-provisioned instance, assigned together with the state
    pub private_ip: Option<String>,
}

impl SetNodeState {
    pub fn new(universe_id: Uuid, node_name: impl Into<String>, state: NodeState) -> Self {
        Self {
            universe_id,
            node_name: node_name.into(),
            state,
            private_ip: None,
        }
    }

    pub fn with_private_ip(mut self, private_ip: impl Into<String>) -> Self {
        self.private_ip = Some(private_ip.into());
        self
    }
}

#[async_trait]
impl Subtask for SetNodeState {
    fn name(&self) -> &'static str {
        "SetNodeState"
    }

    fn universe_id(&self) -> Uuid {
        self.universe_id
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let target = self.state;
        let updated = mutate(ctx.universes(), self.universe_id, |definition| {
            let node = node_mut(definition, &self.node_name)?;
            node.apply_state(target)?;
            if let Some(ip) = &self.private_ip {
                node.private_ip = Some(ip.clone());
            }
            Ok(())
        })
        .await?;

        info!(
            universe_id = %self.universe_id,
            node = %self.node_name,
            state = %target,
            version = updated.version(),
            "Node state updated"
        );
        Ok(())
    }
}
