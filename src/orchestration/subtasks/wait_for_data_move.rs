use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::cluster::{ClusterClientGuard, RemoteResponse};
use crate::error::Result;
use crate::orchestration::poller::{percent_complete, ConvergencePoller};
use crate::orchestration::subtask::Subtask;
use crate::orchestration::task::TaskContext;

const OPERATION: &str = "WaitForDataMove";

/// Wait until all data has moved off servers being removed
#[derive(Debug, Clone)]
pub struct WaitForDataMove {
    pub universe_id: Uuid,
}

impl WaitForDataMove {
    pub fn new(universe_id: Uuid) -> Self {
        Self { universe_id }
    }
}

#[async_trait]
impl Subtask for WaitForDataMove {
    fn name(&self) -> &'static str {
        OPERATION
    }

    fn universe_id(&self) -> Uuid {
        self.universe_id
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let universe = ctx.find_universe(self.universe_id).await?;
        let client = ctx.cluster_client(&universe).await?;
        let poller = ConvergencePoller::from_config(OPERATION, &ctx.config().data_move);

        let outcome = poller
            .poll(|| move_completion(&client), percent_complete)
            .await?;

        info!(
            universe_id = %self.universe_id,
            percent = outcome.value,
            attempts = outcome.attempts,
            errors = outcome.errors,
            "✅ Data move completed"
        );
        Ok(())
    }
}

async fn move_completion(client: &ClusterClientGuard) -> Result<f64> {
    Ok(client
        .get_load_move_completion()
        .await?
        .into_result("GetLoadMoveCompletion")?
        .percent_completed)
}
