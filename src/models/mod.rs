//! # Models
//!
//! Domain records the engine reads and writes: the versioned universe aggregate
//! with its nodes, and the task-run audit trail.

pub mod node;
pub mod task_run;
pub mod universe;

pub use node::{NodeDetails, NodeState, ServerType};
pub use task_run::{SubTaskGroupType, SubTaskRun, TargetKind, TaskRun, TaskRunFilter, TaskType};
pub use universe::{Universe, UniverseDefinition, UserIntent};
