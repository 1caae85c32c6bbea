//! # Task Registry
//!
//! Closed set of task kinds mapped to their constructors. Submission resolves a
//! [`TaskKind`] plus [`TaskParams`] into a ready-to-run [`Task`] without any
//! name-string dispatch.
//!
//! ```rust
//! use commissioner_core::orchestration::registry::{NodeTaskParams, TaskKind, TaskParams, TaskRegistry};
//! use uuid::Uuid;
//!
//! let registry = TaskRegistry::default();
//! let task = registry
//!     .create(
//!         TaskKind::AddNodeToUniverse,
//!         TaskParams::Node(NodeTaskParams::new(Uuid::new_v4(), "n3")),
//!     )
//!     .unwrap();
//! assert_eq!(task.name(), "AddNodeToUniverse");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::Task;
use super::tasks::{AddNodeToUniverse, RemoveNodeFromUniverse, SetUniverseKey};
use crate::error::{CommissionerError, Result};
use crate::models::{TargetKind, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    AddNodeToUniverse,
    RemoveNodeFromUniverse,
    SetUniverseKey,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::AddNodeToUniverse,
        TaskKind::RemoveNodeFromUniverse,
        TaskKind::SetUniverseKey,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskKind::AddNodeToUniverse => "AddNodeToUniverse",
            TaskKind::RemoveNodeFromUniverse => "RemoveNodeFromUniverse",
            TaskKind::SetUniverseKey => "SetUniverseKey",
        }
    }

    pub fn task_type(self) -> TaskType {
        match self {
            TaskKind::AddNodeToUniverse => TaskType::Add,
            TaskKind::RemoveNodeFromUniverse => TaskType::Remove,
            TaskKind::SetUniverseKey => TaskType::SetEncryptionKey,
        }
    }

    pub fn target_kind(self) -> TargetKind {
        match self {
            TaskKind::AddNodeToUniverse | TaskKind::RemoveNodeFromUniverse => TargetKind::Node,
            TaskKind::SetUniverseKey => TargetKind::Universe,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTaskParams {
    pub universe_id: Uuid,
    pub node_name: String,
    /// Fail with a conflict unless the universe is still at this version
    pub expected_universe_version: Option<i64>,
    /// Address of a freshly provisioned instance for a node being re-added
    #[serde(default)]
    pub private_ip: Option<String>,
}

impl NodeTaskParams {
    pub fn new(universe_id: Uuid, node_name: impl Into<String>) -> Self {
        Self {
            universe_id,
            node_name: node_name.into(),
            expected_universe_version: None,
            private_ip: None,
        }
    }

    pub fn with_private_ip(mut self, private_ip: impl Into<String>) -> Self {
        self.private_ip = Some(private_ip.into());
        self
    }

    pub fn expecting_version(mut self, version: i64) -> Self {
        self.expected_universe_version = Some(version);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeyParams {
    pub universe_id: Uuid,
    pub kms_config_id: Uuid,
    pub expected_universe_version: Option<i64>,
}

impl EncryptionKeyParams {
    pub fn new(universe_id: Uuid, kms_config_id: Uuid) -> Self {
        Self {
            universe_id,
            kms_config_id,
            expected_universe_version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskParams {
    Node(NodeTaskParams),
    EncryptionKey(EncryptionKeyParams),
}

impl TaskParams {
    pub fn universe_id(&self) -> Uuid {
        match self {
            TaskParams::Node(params) => params.universe_id,
            TaskParams::EncryptionKey(params) => params.universe_id,
        }
    }

    pub fn expected_universe_version(&self) -> Option<i64> {
        match self {
            TaskParams::Node(params) => params.expected_universe_version,
            TaskParams::EncryptionKey(params) => params.expected_universe_version,
        }
    }

    pub(crate) fn into_node(self, kind: TaskKind) -> Result<NodeTaskParams> {
        match self {
            TaskParams::Node(params) => Ok(params),
            other => Err(mismatched(kind, &other)),
        }
    }

    pub(crate) fn into_encryption_key(self, kind: TaskKind) -> Result<EncryptionKeyParams> {
        match self {
            TaskParams::EncryptionKey(params) => Ok(params),
            other => Err(mismatched(kind, &other)),
        }
    }

    fn variant(&self) -> &'static str {
        match self {
            TaskParams::Node(_) => "node",
            TaskParams::EncryptionKey(_) => "encryption_key",
        }
    }
}

fn mismatched(kind: TaskKind, params: &TaskParams) -> CommissionerError {
    CommissionerError::Validation(format!(
        "{kind} cannot be built from {} parameters",
        params.variant()
    ))
}

pub type TaskConstructor = fn(TaskParams) -> Result<Arc<dyn Task>>;

pub struct TaskRegistry {
    constructors: HashMap<TaskKind, TaskConstructor>,
}

impl TaskRegistry {
    /// Registry without any task kinds
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: TaskKind, constructor: TaskConstructor) -> &mut Self {
        self.constructors.insert(kind, constructor);
        self
    }

    pub fn is_registered(&self, kind: TaskKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    pub fn create(&self, kind: TaskKind, params: TaskParams) -> Result<Arc<dyn Task>> {
        let constructor = self.constructors.get(&kind).ok_or_else(|| {
            CommissionerError::Validation(format!("task kind {kind} is not registered"))
        })?;
        constructor(params)
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(TaskKind::AddNodeToUniverse, |params| {
                let params = params.into_node(TaskKind::AddNodeToUniverse)?;
                Ok(Arc::new(AddNodeToUniverse::new(params)))
            })
            .register(TaskKind::RemoveNodeFromUniverse, |params| {
                let params = params.into_node(TaskKind::RemoveNodeFromUniverse)?;
                Ok(Arc::new(RemoveNodeFromUniverse::new(params)))
            })
            .register(TaskKind::SetUniverseKey, |params| {
                let params = params.into_encryption_key(TaskKind::SetUniverseKey)?;
                Ok(Arc::new(SetUniverseKey::new(params)))
            });
        registry
    }
}
