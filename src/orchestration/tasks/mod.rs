//! Bundled tasks. Each one locks its universe, plans its groups against the
//! locked copy and unlocks whatever happens.

mod add_node;
mod remove_node;
mod set_universe_key;

pub use add_node::AddNodeToUniverse;
pub use remove_node::RemoveNodeFromUniverse;
pub use set_universe_key::SetUniverseKey;

use serde::Serialize;
use tracing::warn;

/// Task parameters as persisted on the run row. A failure is logged and
/// stored as null rather than failing the submission.
pub(crate) fn params_details<T: Serialize>(task: &str, params: &T) -> serde_json::Value {
    serde_json::to_value(params).unwrap_or_else(|e| {
        warn!(task = %task, error = %e, "Failed to serialize task parameters");
        serde_json::Value::Null
    })
}
