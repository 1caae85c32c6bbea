//! # Cluster RPC Collaborator
//!
//! The engine's view of the managed database cluster's control protocol. Real
//! deployments plug in a client for the master/tablet-server RPCs; tests plug in
//! scripted fakes.
//!
//! Two failure channels are kept apart:
//! - `Err(RemoteUnavailable)` from a trait method means the call never got an answer.
//! - A response whose [`RemoteResponse::has_error`] is true means the cluster
//!   answered and reported a domain error. [`RemoteResponse::into_result`] turns
//!   that into [`CommissionerError::ApplicationError`].

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CommissionerError, Result};
use crate::models::ServerType;

/// Quorum membership change requested from the master leader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterChange {
    AddMaster,
    RemoveMaster,
}

impl MasterChange {
    pub fn is_add(self) -> bool {
        matches!(self, MasterChange::AddMaster)
    }
}

/// Embedded error reporting shared by every RPC response
pub trait RemoteResponse: Sized {
    fn error_message(&self) -> Option<&str>;

    fn has_error(&self) -> bool {
        self.error_message().is_some()
    }

    /// Fail with `ApplicationError` when the cluster reported an error
    fn into_result(self, operation: &str) -> Result<Self> {
        match self.error_message() {
            Some(message) => Err(CommissionerError::ApplicationError(format!(
                "{operation} failed: {message}"
            ))),
            None => Ok(self),
        }
    }
}

macro_rules! remote_response {
    ($ty:ty) => {
        impl RemoteResponse for $ty {
            fn error_message(&self) -> Option<&str> {
                self.error.as_deref()
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeConfigResponse {
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadMoveCompletionResponse {
    /// Percentage of data moved off blacklisted servers
    pub percent_completed: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerStateResponse {
    pub pending_moves: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerReadyResponse {
    pub num_not_running_tablets: u32,
    /// The server's version does not implement the readiness RPC
    pub unsupported: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyStatusResponse {
    pub has_key: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddUniverseKeysResponse {
    pub error: Option<String>,
}

remote_response!(ChangeConfigResponse);
remote_response!(LoadMoveCompletionResponse);
remote_response!(LoadBalancerStateResponse);
remote_response!(ServerReadyResponse);
remote_response!(KeyStatusResponse);
remote_response!(AddUniverseKeysResponse);

/// Operations the engine issues against a connected cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn change_master_config(
        &self,
        host: &str,
        port: u16,
        change: MasterChange,
        use_host_port: bool,
    ) -> Result<ChangeConfigResponse>;

    async fn get_load_move_completion(&self) -> Result<LoadMoveCompletionResponse>;

    async fn get_load_balancer_state(&self) -> Result<LoadBalancerStateResponse>;

    async fn is_server_ready(
        &self,
        host_port: &str,
        server_type: ServerType,
    ) -> Result<ServerReadyResponse>;

    async fn has_universe_key_in_memory(
        &self,
        host_port: &str,
        key_ref: &[u8],
    ) -> Result<KeyStatusResponse>;

    async fn add_universe_keys(
        &self,
        host_port: &str,
        key_ref: &[u8],
        key_material: &[u8],
    ) -> Result<AddUniverseKeysResponse>;
}

/// Hands out clients per master address list and takes them back when a task is done
#[async_trait]
pub trait ClusterClientFactory: Send + Sync {
    async fn connect(
        &self,
        master_addresses: &str,
        certificate: Option<&str>,
    ) -> Result<Arc<dyn ClusterClient>>;

    fn release(&self, client: Arc<dyn ClusterClient>, master_addresses: &str);
}

/// Scoped client: released back to its factory when dropped, whatever the outcome
pub struct ClusterClientGuard {
    client: Arc<dyn ClusterClient>,
    factory: Arc<dyn ClusterClientFactory>,
    master_addresses: String,
}

impl ClusterClientGuard {
    pub async fn acquire(
        factory: Arc<dyn ClusterClientFactory>,
        master_addresses: &str,
        certificate: Option<&str>,
    ) -> Result<Self> {
        if master_addresses.is_empty() {
            return Err(CommissionerError::Validation(
                "universe has no master addresses".to_string(),
            ));
        }
        let client = factory.connect(master_addresses, certificate).await?;
        Ok(Self {
            client,
            factory,
            master_addresses: master_addresses.to_string(),
        })
    }

    pub fn master_addresses(&self) -> &str {
        &self.master_addresses
    }
}

impl Deref for ClusterClientGuard {
    type Target = dyn ClusterClient;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl Drop for ClusterClientGuard {
    fn drop(&mut self) {
        self.factory
            .release(Arc::clone(&self.client), &self.master_addresses);
    }
}
