#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Commissioner Core
//!
//! Task engine for a database-cluster control plane.
//!
//! ## Overview
//!
//! Operators ask for cluster changes (add a node, remove a node, rotate a
//! universe key). The [`orchestration::Commissioner`] turns each request into a
//! persisted task run and executes it asynchronously as an ordered queue of
//! subtask groups. Universes are only written through a versioned
//! compare-and-swap, and a per-universe update flag keeps concurrent tasks from
//! stepping on each other.
//!
//! ## Module Organization
//!
//! - [`models`] - Universes, node details and the task-run audit trail
//! - [`database`] - Storage traits with in-memory and PostgreSQL stores
//! - [`state_machine`] - Task-run and subtask-run lifecycle
//! - [`orchestration`] - Commissioner, tasks, subtask groups, updater and poller
//! - [`cluster`] - Remote cluster RPC seam
//! - [`encryption`] - Key material cache, provider seam and the key setter loop
//! - [`notification`] - Failure alerting
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and operation helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use commissioner_core::cluster::ClusterClientFactory;
//! use commissioner_core::config::CommissionerConfig;
//! use commissioner_core::database::InMemoryStore;
//! use commissioner_core::orchestration::{
//!     Commissioner, CommissionerServices, NodeTaskParams, TaskKind, TaskParams, TaskRegistry,
//! };
//! use uuid::Uuid;
//!
//! # async fn example(cluster: Arc<dyn ClusterClientFactory>, universe_id: Uuid)
//! # -> commissioner_core::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! let services = CommissionerServices::new(
//!     store.clone(),
//!     store,
//!     cluster,
//!     CommissionerConfig::default(),
//! );
//! let commissioner = Commissioner::new(services, TaskRegistry::default());
//!
//! let run_id = commissioner
//!     .submit(
//!         TaskKind::RemoveNodeFromUniverse,
//!         TaskParams::Node(NodeTaskParams::new(universe_id, "n3")),
//!     )
//!     .await?;
//! let status = commissioner.get_status(run_id).await?;
//! println!("{} is {}", status.description, status.state);
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod database;
pub mod encryption;
pub mod error;
pub mod logging;
pub mod models;
pub mod notification;
pub mod orchestration;
pub mod state_machine;

pub use config::{CommissionerConfig, ConfigManager};
pub use error::{CommissionerError, ConflictReason, Result};
pub use models::{NodeDetails, NodeState, ServerType, TaskRun, Universe, UniverseDefinition};
pub use orchestration::{Commissioner, TaskKind, TaskParams, TaskStatus};
pub use state_machine::{TaskRunEvent, TaskRunState};
