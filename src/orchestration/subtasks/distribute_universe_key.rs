use async_trait::async_trait;
use uuid::Uuid;

use super::node;
use crate::encryption::{push_key_to_master, resolve_cached, ActiveKey};
use crate::error::{CommissionerError, Result};
use crate::models::ServerType;
use crate::orchestration::subtask::Subtask;
use crate::orchestration::task::TaskContext;

/// Push the universe's active key material to one master
#[derive(Debug, Clone)]
pub struct DistributeUniverseKey {
    pub universe_id: Uuid,
    pub node_name: String,
    pub key: ActiveKey,
}

impl DistributeUniverseKey {
    pub fn new(universe_id: Uuid, node_name: impl Into<String>, key: ActiveKey) -> Self {
        Self {
            universe_id,
            node_name: node_name.into(),
            key,
        }
    }
}

#[async_trait]
impl Subtask for DistributeUniverseKey {
    fn name(&self) -> &'static str {
        "DistributeUniverseKey"
    }

    fn universe_id(&self) -> Uuid {
        self.universe_id
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let universe = ctx.find_universe(self.universe_id).await?;
        let host_port = node(&universe, &self.node_name)?
            .host_port(ServerType::Master)
            .ok_or_else(|| {
                CommissionerError::Validation(format!("master {} has no address", self.node_name))
            })?;

        let services = ctx.services();
        let material = resolve_cached(
            &services.key_cache,
            services.key_provider.as_ref(),
            self.universe_id,
            &self.key,
        )
        .await?;

        let client = ctx.cluster_client(&universe).await?;
        push_key_to_master(&*client, &host_port, &self.key.key_ref, &material).await?;
        Ok(())
    }
}
