//! Built-in subtasks used by the bundled tasks.

mod change_master_config;
mod distribute_universe_key;
mod mark_update_success;
mod set_node_state;
mod update_node_process;
mod wait_for_data_move;
mod wait_for_load_balance;
mod wait_for_server_ready;

pub use change_master_config::ChangeMasterConfig;
pub use distribute_universe_key::DistributeUniverseKey;
pub use mark_update_success::MarkUniverseUpdateSuccess;
pub use set_node_state::SetNodeState;
pub use update_node_process::UpdateNodeProcess;
pub use wait_for_data_move::WaitForDataMove;
pub use wait_for_load_balance::WaitForLoadBalance;
pub use wait_for_server_ready::WaitForServerReady;

use crate::error::{CommissionerError, Result};
use crate::models::{NodeDetails, Universe, UniverseDefinition};

pub(crate) fn node<'a>(universe: &'a Universe, node_name: &str) -> Result<&'a NodeDetails> {
    universe
        .node(node_name)
        .ok_or_else(|| CommissionerError::not_found("node", node_name))
}

pub(crate) fn node_mut<'a>(
    definition: &'a mut UniverseDefinition,
    node_name: &str,
) -> Result<&'a mut NodeDetails> {
    definition
        .node_mut(node_name)
        .ok_or_else(|| CommissionerError::not_found("node", node_name))
}
