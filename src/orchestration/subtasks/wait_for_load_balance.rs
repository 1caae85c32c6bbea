use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::cluster::{ClusterClientGuard, RemoteResponse};
use crate::error::Result;
use crate::orchestration::poller::ConvergencePoller;
use crate::orchestration::subtask::Subtask;
use crate::orchestration::task::TaskContext;

const OPERATION: &str = "WaitForLoadBalance";

/// Wait until the load balancer has no pending moves.
///
/// Sleeps first so the balancer has started, then polls within the configured bound.
#[derive(Debug, Clone)]
pub struct WaitForLoadBalance {
    pub universe_id: Uuid,
}

impl WaitForLoadBalance {
    pub fn new(universe_id: Uuid) -> Self {
        Self { universe_id }
    }
}

#[async_trait]
impl Subtask for WaitForLoadBalance {
    fn name(&self) -> &'static str {
        OPERATION
    }

    fn universe_id(&self) -> Uuid {
        self.universe_id
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let universe = ctx.find_universe(self.universe_id).await?;
        let client = ctx.cluster_client(&universe).await?;
        let config = &ctx.config().load_balance;

        tokio::time::sleep(config.initial_delay()).await;

        let poller = ConvergencePoller::from_config(OPERATION, &config.poller());
        let outcome = poller
            .poll(|| pending_moves(&client), |pending| *pending == 0)
            .await?;

        info!(
            universe_id = %self.universe_id,
            attempts = outcome.attempts,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "✅ Load balancer idle"
        );
        Ok(())
    }
}

async fn pending_moves(client: &ClusterClientGuard) -> Result<u64> {
    Ok(client
        .get_load_balancer_state()
        .await?
        .into_result("GetLoadBalancerState")?
        .pending_moves)
}
