//! # Universe Model
//!
//! The versioned cluster-state aggregate that every task mutates.
//!
//! ## Mutation Contract
//!
//! A `Universe` is read freely but only written through
//! [`crate::orchestration::updater::mutate`], which applies a closure to a copy
//! of the [`UniverseDefinition`] and persists it under a compare-and-swap on
//! `version`. There is no public setter for the definition or the version.
//!
//! ## Database Schema
//!
//! Maps to the `universes` table:
//! - `id`: Primary key (UUID)
//! - `name`: Unique universe name (TEXT)
//! - `version`: CAS counter, starts at 1 (BIGINT)
//! - `definition`: JSONB serialization of [`UniverseDefinition`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::{NodeDetails, NodeState, ServerType};

/// Customer-requested shape of the universe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIntent {
    pub universe_name: String,
    pub replication_factor: u32,
    pub num_nodes: u32,
}

impl Default for UserIntent {
    fn default() -> Self {
        Self {
            universe_name: String::new(),
            replication_factor: 3,
            num_nodes: 3,
        }
    }
}

/// Structured definition blob stored with each universe version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniverseDefinition {
    /// Advisory lock: set by the task that owns the universe for its duration
    pub update_in_progress: bool,
    /// Whether the last locked update ran through to its success marker
    pub update_succeeded: bool,
    pub user_intent: UserIntent,
    pub nodes: Vec<NodeDetails>,
    pub certificate: Option<String>,
}

impl UniverseDefinition {
    pub fn node(&self, node_name: &str) -> Option<&NodeDetails> {
        self.nodes.iter().find(|n| n.node_name == node_name)
    }

    pub fn node_mut(&mut self, node_name: &str) -> Option<&mut NodeDetails> {
        self.nodes.iter_mut().find(|n| n.node_name == node_name)
    }

    pub fn masters(&self) -> impl Iterator<Item = &NodeDetails> {
        self.nodes.iter().filter(|n| n.is_master)
    }

    pub fn tservers(&self) -> impl Iterator<Item = &NodeDetails> {
        self.nodes.iter().filter(|n| n.is_tserver)
    }

    /// Comma-separated `ip:port` list of master processes that still have an address
    pub fn master_addresses(&self) -> String {
        self.masters()
            .filter_map(|n| n.host_port(ServerType::Master))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Fewer running masters than the replication factor asks for
    pub fn are_masters_under_replicated(&self) -> bool {
        let live_masters = self
            .masters()
            .filter(|n| n.state == NodeState::Running)
            .count() as u32;
        live_masters < self.user_intent.replication_factor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    id: Uuid,
    name: String,
    version: i64,
    definition: UniverseDefinition,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Universe {
    /// A freshly provisioned universe starts at version 1
    pub fn new(name: impl Into<String>, definition: UniverseDefinition) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: 1,
            definition,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a universe exactly as a store persisted it
    pub fn restore(
        id: Uuid,
        name: String,
        version: i64,
        definition: UniverseDefinition,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            version,
            definition,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn definition(&self) -> &UniverseDefinition {
        &self.definition
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_update_in_progress(&self) -> bool {
        self.definition.update_in_progress
    }

    pub fn node(&self, node_name: &str) -> Option<&NodeDetails> {
        self.definition.node(node_name)
    }

    pub fn master_addresses(&self) -> String {
        self.definition.master_addresses()
    }

    pub fn certificate(&self) -> Option<&str> {
        self.definition.certificate.as_deref()
    }

    pub(crate) fn definition_mut(&mut self) -> &mut UniverseDefinition {
        &mut self.definition
    }

    /// Record a successful compare-and-swap
    pub(crate) fn advance(&mut self, new_version: i64, updated_at: DateTime<Utc>) {
        self.version = new_version;
        self.updated_at = updated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_node_definition() -> UniverseDefinition {
        UniverseDefinition {
            user_intent: UserIntent {
                universe_name: "orders".to_string(),
                replication_factor: 3,
                num_nodes: 3,
            },
            nodes: vec![
                NodeDetails::new("n1", "10.0.0.1")
                    .as_master()
                    .with_state(NodeState::Running),
                NodeDetails::new("n2", "10.0.0.2")
                    .as_master()
                    .with_state(NodeState::Running),
                NodeDetails::new("n3", "10.0.0.3").with_state(NodeState::Running),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_new_universe_starts_at_version_one() {
        let universe = Universe::new("orders", UniverseDefinition::default());
        assert_eq!(universe.version(), 1);
        assert!(!universe.is_update_in_progress());
    }

    #[test]
    fn test_master_addresses() {
        let universe = Universe::new("orders", three_node_definition());
        assert_eq!(universe.master_addresses(), "10.0.0.1:7100,10.0.0.2:7100");
    }

    #[test]
    fn test_under_replicated_masters() {
        let mut definition = three_node_definition();
        assert!(definition.are_masters_under_replicated());

        definition.node_mut("n3").unwrap().is_master = true;
        assert!(!definition.are_masters_under_replicated());
    }

    #[test]
    fn test_definition_round_trips_through_json() {
        let definition = three_node_definition();
        let json = serde_json::to_value(&definition).unwrap();
        let parsed: UniverseDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, definition);
    }
}
