use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use super::node;
use crate::cluster::{ClusterClientGuard, RemoteResponse};
use crate::error::{CommissionerError, Result};
use crate::models::ServerType;
use crate::orchestration::poller::ConvergencePoller;
use crate::orchestration::subtask::Subtask;
use crate::orchestration::task::TaskContext;

const OPERATION: &str = "WaitForServerReady";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Ready,
    NotReady(u32),
    Unsupported,
}

async fn readiness(
    client: &ClusterClientGuard,
    host_port: &str,
    server_type: ServerType,
) -> Result<Readiness> {
    let response = client.is_server_ready(host_port, server_type).await?;
    if response.unsupported {
        return Ok(Readiness::Unsupported);
    }
    let response = response.into_result("IsServerReady")?;
    Ok(match response.num_not_running_tablets {
        0 => Readiness::Ready,
        n => Readiness::NotReady(n),
    })
}

/// Wait for a restarted server to report all of its tablets running.
///
/// Best effort: a server that stays unready, keeps failing the check, or does
/// not implement it is logged, and the rest of `wait_time` is slept instead.
#[derive(Debug, Clone)]
pub struct WaitForServerReady {
    pub universe_id: Uuid,
    pub node_name: String,
    pub server_type: ServerType,
    /// Total time to give the server; falls back to `server_ready.default_sleep_after_restart_ms`
    pub wait_time: Option<Duration>,
}

impl WaitForServerReady {
    pub fn new(universe_id: Uuid, node_name: impl Into<String>, server_type: ServerType) -> Self {
        Self {
            universe_id,
            node_name: node_name.into(),
            server_type,
            wait_time: None,
        }
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = Some(wait_time);
        self
    }
}

#[async_trait]
impl Subtask for WaitForServerReady {
    fn name(&self) -> &'static str {
        OPERATION
    }

    fn universe_id(&self) -> Uuid {
        self.universe_id
    }

    async fn run(&self, ctx: &TaskContext) -> Result<()> {
        let universe = ctx.find_universe(self.universe_id).await?;
        let host_port = node(&universe, &self.node_name)?
            .host_port(self.server_type)
            .ok_or_else(|| {
                CommissionerError::Validation(format!("node {} has no address", self.node_name))
            })?;
        let client = ctx.cluster_client(&universe).await?;
        let config = &ctx.config().server_ready;
        let started = Instant::now();
        let server_type = self.server_type;

        let poller = ConvergencePoller::from_config(OPERATION, &config.poller());
        let result = poller
            .poll(
                || readiness(&client, &host_port, server_type),
                |state| !matches!(state, Readiness::NotReady(_)),
            )
            .await;

        match result {
            Ok(outcome) if outcome.value == Readiness::Ready => {
                info!(
                    universe_id = %self.universe_id,
                    server = %host_port,
                    server_type = %server_type,
                    attempts = outcome.attempts,
                    "✅ Server ready"
                );
                return Ok(());
            }
            Ok(_) => warn!(
                server = %host_port,
                server_type = %server_type,
                "Server does not support readiness checks"
            ),
            Err(e @ (CommissionerError::Timeout { .. } | CommissionerError::TooManyErrors { .. })) => {
                warn!(
                    server = %host_port,
                    server_type = %server_type,
                    error = %e,
                    "Server not confirmed ready, continuing"
                )
            }
            Err(e) => return Err(e),
        }

        let wait_time = self
            .wait_time
            .unwrap_or_else(|| Duration::from_millis(config.default_sleep_after_restart_ms));
        let remaining = wait_time.saturating_sub(started.elapsed());
        if !remaining.is_zero() {
            info!(
                server = %host_port,
                remaining_ms = remaining.as_millis() as u64,
                "Sleeping out remaining server wait time"
            );
            tokio::time::sleep(remaining).await;
        }
        Ok(())
    }
}
