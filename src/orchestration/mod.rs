//! # Orchestration Engine
//!
//! Task execution for cluster operations.
//!
//! ## Core Components
//!
//! - **Commissioner**: accepts submissions, enforces one live run per universe,
//!   answers status queries and abort requests
//! - **Task**: plans a [`SubTaskGroupQueue`] for one operator intent and drives it
//! - **SubTaskGroupQueue**: runs groups strictly in order, the subtasks of a group
//!   concurrently on the task's [`TaskWorkerPool`]
//! - **Updater**: the only path that writes a universe, a versioned
//!   compare-and-swap around a mutation closure
//! - **ConvergencePoller**: bounded retry-until-converged loop for remote status checks
//! - **TaskRegistry**: closed set of task kinds mapped to constructors

pub mod commissioner;
pub mod poller;
pub mod registry;
pub mod subtask;
pub mod subtask_group;
pub mod subtasks;
pub mod task;
pub mod tasks;
pub mod universe_task;
pub mod updater;
pub mod worker_pool;

pub use commissioner::{Commissioner, TaskStatus};
pub use poller::{percent_complete, ConvergencePoller, PollBound, PollOutcome};
pub use registry::{EncryptionKeyParams, NodeTaskParams, TaskKind, TaskParams, TaskRegistry};
pub use subtask::{FailurePolicy, Subtask};
pub use subtask_group::{SubTaskGroup, SubTaskGroupQueue};
pub use task::{CommissionerServices, Task, TaskContext};
pub use tasks::{AddNodeToUniverse, RemoveNodeFromUniverse, SetUniverseKey};
pub use universe_task::{
    check_universe_version, lock_universe_for_update, unlock_universe_for_update,
    UniverseTaskBase,
};
pub use updater::{mutate, mutate_at};
pub use worker_pool::TaskWorkerPool;
