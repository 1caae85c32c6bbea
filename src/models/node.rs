//! # Node Details
//!
//! Per-node state carried inside a universe definition. Node states only change
//! through subtasks that go through the versioned updater, and every change is
//! checked against [`NodeState::can_transition_to`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CommissionerError, Result};

pub const DEFAULT_MASTER_RPC_PORT: u16 = 7100;
pub const DEFAULT_TSERVER_RPC_PORT: u16 = 9100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    ToBeAdded,
    Provisioned,
    SoftwareInstalled,
    ToJoinCluster,
    Running,
    Stopping,
    Stopped,
    Adding,
    Removing,
    Removed,
    ToBeDecommissioned,
    Decommissioned,
}

impl NodeState {
    /// Whether a node in this state may be moved to `next`.
    ///
    /// Re-applying the current state is accepted so a retried subtask is harmless.
    /// A decommissioned node can only come back through the `Adding` flow.
    pub fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;

        if self == next {
            return true;
        }

        match self {
            ToBeAdded => matches!(next, Provisioned | Adding | Decommissioned),
            Provisioned => matches!(next, SoftwareInstalled | Decommissioned),
            SoftwareInstalled => matches!(next, ToJoinCluster | Running | Decommissioned),
            ToJoinCluster => matches!(next, Running | Decommissioned),
            Running => matches!(next, Stopping | Removing | ToBeDecommissioned),
            Stopping => matches!(next, Stopped | Running),
            Stopped => matches!(next, Running | Removing | ToBeDecommissioned),
            Adding => matches!(
                next,
                Provisioned | SoftwareInstalled | ToJoinCluster | Running | Removed | Decommissioned
            ),
            Removing => matches!(next, Removed | Running),
            Removed => matches!(next, Adding | ToBeDecommissioned | Decommissioned),
            ToBeDecommissioned => matches!(next, Decommissioned),
            Decommissioned => matches!(next, Adding),
        }
    }

    /// States from which a node may be (re)added to a universe
    pub fn is_addable(self) -> bool {
        matches!(self, NodeState::Removed | NodeState::Decommissioned)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerType {
    Master,
    TServer,
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerType::Master => f.write_str("MASTER"),
            ServerType::TServer => f.write_str("TSERVER"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDetails {
    pub node_name: String,
    pub state: NodeState,
    pub private_ip: Option<String>,
    pub master_rpc_port: u16,
    pub tserver_rpc_port: u16,
    pub is_master: bool,
    pub is_tserver: bool,
}

impl NodeDetails {
    pub fn new(node_name: impl Into<String>, private_ip: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            state: NodeState::ToBeAdded,
            private_ip: Some(private_ip.into()),
            master_rpc_port: DEFAULT_MASTER_RPC_PORT,
            tserver_rpc_port: DEFAULT_TSERVER_RPC_PORT,
            is_master: false,
            is_tserver: true,
        }
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    pub fn as_master(mut self) -> Self {
        self.is_master = true;
        self
    }

    /// Move to `next` if the state table allows it. A decommissioned node
    /// loses its address; re-adding it needs a freshly provisioned one.
    pub fn apply_state(&mut self, next: NodeState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(CommissionerError::InvalidTransition {
                entity: format!("node {}", self.node_name),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        if next == NodeState::Decommissioned {
            self.private_ip = None;
        }
        Ok(())
    }

    pub fn rpc_port(&self, server_type: ServerType) -> u16 {
        match server_type {
            ServerType::Master => self.master_rpc_port,
            ServerType::TServer => self.tserver_rpc_port,
        }
    }

    /// `ip:port` for the given process, if the node still has an address
    pub fn host_port(&self, server_type: ServerType) -> Option<String> {
        self.private_ip
            .as_deref()
            .map(|ip| format!("{ip}:{}", self.rpc_port(server_type)))
    }
}
