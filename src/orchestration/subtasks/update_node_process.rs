use async_trait::async_trait;
use uuid::Uuid;

use super::node_mut;
use crate::error::Result;
use crate::models::ServerType;
use crate::orchestration::subtask::Subtask;
use crate::orchestration::task::TaskContext;
use crate::orchestration::updater::mutate;

/// Record that a node gained or lost a master or tserver process
#[derive(Debug, Clone)]
pub struct UpdateNodeProcess {
    pub universe_id: Uuid,
    pub node_name: String,
    pub server_type: ServerType,
    pub is_add: bool,
}

impl UpdateNodeProcess {
    pub fn new(
        universe_id: Uuid,
        node_name: impl Into<String>,
        server_type: ServerType,
        is_add: bool,
    ) -> Self {
        Self {
            universe_id,
            node_name: node_name.into(),
            server_type,
            is_add,
        }
    }
}

#[async_trait]
impl Subtask for UpdateNodeProcess {
    fn name(&self) -> &'static str {
        "UpdateNodeProcess"
    }

    fn universe_id(&self) -> Uuid {
        self.universe_id
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        mutate(ctx.universes(), self.universe_id, |definition| {
            let node = node_mut(definition, &self.node_name)?;
            match self.server_type {
                ServerType::Master => node.is_master = self.is_add,
                ServerType::TServer => node.is_tserver = self.is_add,
            }
            Ok(())
        })
        .await?;
        Ok(())
    }
}
