use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{CommissionerError, Result};
use crate::orchestration::subtask::Subtask;
use crate::orchestration::task::TaskContext;
use crate::orchestration::updater::mutate;

/// Final step of a locked task: record that every group before it succeeded
#[derive(Debug, Clone)]
pub struct MarkUniverseUpdateSuccess {
    pub universe_id: Uuid,
}

impl MarkUniverseUpdateSuccess {
    pub fn new(universe_id: Uuid) -> Self {
        Self { universe_id }
    }
}

#[async_trait]
impl Subtask for MarkUniverseUpdateSuccess {
    fn name(&self) -> &'static str {
        "MarkUniverseUpdateSuccess"
    }

    fn universe_id(&self) -> Uuid {
        self.universe_id
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        mutate(ctx.universes(), self.universe_id, |definition| {
            if !definition.update_in_progress {
                return Err(CommissionerError::Validation(format!(
                    "universe {} is not locked for update",
                    self.universe_id
                )));
            }
            definition.update_succeeded = true;
            Ok(())
        })
        .await?;
        Ok(())
    }
}
