//! # Subtask Contract
//!
//! The unit the engine schedules. Parameters are fixed at construction; `run`
//! may call the cluster, mutate the universe through the updater, and log. The
//! engine never retries a subtask.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::task::TaskContext;
use crate::error::{CommissionerError, Result};

#[async_trait]
pub trait Subtask: Send + Sync {
    fn name(&self) -> &'static str;

    /// Universe the subtask reads or mutates
    fn universe_id(&self) -> Uuid;

    async fn run(&self, ctx: &TaskContext) -> Result<()>;
}

/// How a subtask treats a remote call that never got an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Every failure fails the subtask
    #[default]
    Fatal,
    /// Transport failures are logged and swallowed; reported errors still fail
    BestEffort,
}

impl FailurePolicy {
    /// Decide whether `error` from `operation` fails the subtask
    pub fn handle(self, operation: &str, error: CommissionerError) -> Result<()> {
        match (self, &error) {
            (FailurePolicy::BestEffort, CommissionerError::RemoteUnavailable(reason)) => {
                warn!(
                    operation = %operation,
                    reason = %reason,
                    "⚠️ Best-effort remote call failed, continuing"
                );
                Ok(())
            }
            _ => Err(error),
        }
    }
}
