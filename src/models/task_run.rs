//! # Task Run Audit Model
//!
//! Durable records of what the commissioner ran: one [`TaskRun`] per submitted
//! task and one [`SubTaskRun`] per scheduled subtask, keyed by
//! `(parent_id, position)`. The tree is exactly one level deep.
//!
//! ## Database Schema
//!
//! Maps to the `task_runs` and `subtask_runs` tables. `subtask_runs.parent_id`
//! references `task_runs.id`; both rows go together when a completed run is
//! garbage collected (see [`crate::database::TaskRunStore::cascade_delete_completed`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CommissionerError, Result};
use crate::state_machine::{determine_target_state, TaskRunEvent, TaskRunState};

/// Customer-facing verb of a task, used in the friendly description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Add,
    Remove,
    SetEncryptionKey,
}

impl TaskType {
    /// Progressive form while running, past form once completed
    pub fn describe(self, completed: bool) -> &'static str {
        match (self, completed) {
            (TaskType::Add, false) => "Adding",
            (TaskType::Add, true) => "Added",
            (TaskType::Remove, false) => "Removing",
            (TaskType::Remove, true) => "Removed",
            (TaskType::SetEncryptionKey, false) => "Setting encryption key",
            (TaskType::SetEncryptionKey, true) => "Set encryption key",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Add => "add",
            TaskType::Remove => "remove",
            TaskType::SetEncryptionKey => "set_encryption_key",
        }
    }
}

impl FromStr for TaskType {
    type Err = CommissionerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(TaskType::Add),
            "remove" => Ok(TaskType::Remove),
            "set_encryption_key" => Ok(TaskType::SetEncryptionKey),
            other => Err(CommissionerError::Validation(format!(
                "unknown task type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Universe,
    Cluster,
    Table,
    Provider,
    Node,
    Backup,
    KmsConfiguration,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Universe => "universe",
            TargetKind::Cluster => "cluster",
            TargetKind::Table => "table",
            TargetKind::Provider => "provider",
            TargetKind::Node => "node",
            TargetKind::Backup => "backup",
            TargetKind::KmsConfiguration => "kms_configuration",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TargetKind::Universe => "Universe",
            TargetKind::Cluster => "Cluster",
            TargetKind::Table => "Table",
            TargetKind::Provider => "Provider",
            TargetKind::Node => "Node",
            TargetKind::Backup => "Backup",
            TargetKind::KmsConfiguration => "KMS Configuration",
        };
        f.write_str(label)
    }
}

impl FromStr for TargetKind {
    type Err = CommissionerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "universe" => Ok(TargetKind::Universe),
            "cluster" => Ok(TargetKind::Cluster),
            "table" => Ok(TargetKind::Table),
            "provider" => Ok(TargetKind::Provider),
            "node" => Ok(TargetKind::Node),
            "backup" => Ok(TargetKind::Backup),
            "kms_configuration" => Ok(TargetKind::KmsConfiguration),
            other => Err(CommissionerError::Validation(format!(
                "unknown target kind: {other}"
            ))),
        }
    }
}

/// Phase label attached to each subtask group, recorded on its audit rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskGroupType {
    ConfigureUniverse,
    StartingNodeProcesses,
    WaitingForServers,
    UpdatingMasterConfig,
    WaitForDataMigration,
    WaitForLoadBalance,
    RemovingUnusedServers,
    SettingEncryptionKey,
}

impl SubTaskGroupType {
    pub fn as_str(self) -> &'static str {
        match self {
            SubTaskGroupType::ConfigureUniverse => "configure_universe",
            SubTaskGroupType::StartingNodeProcesses => "starting_node_processes",
            SubTaskGroupType::WaitingForServers => "waiting_for_servers",
            SubTaskGroupType::UpdatingMasterConfig => "updating_master_config",
            SubTaskGroupType::WaitForDataMigration => "wait_for_data_migration",
            SubTaskGroupType::WaitForLoadBalance => "wait_for_load_balance",
            SubTaskGroupType::RemovingUnusedServers => "removing_unused_servers",
            SubTaskGroupType::SettingEncryptionKey => "setting_encryption_key",
        }
    }
}

impl fmt::Display for SubTaskGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubTaskGroupType {
    type Err = CommissionerError;

    fn from_str(s: &str) -> Result<Self> {
        let group_type = match s {
            "configure_universe" => SubTaskGroupType::ConfigureUniverse,
            "starting_node_processes" => SubTaskGroupType::StartingNodeProcesses,
            "waiting_for_servers" => SubTaskGroupType::WaitingForServers,
            "updating_master_config" => SubTaskGroupType::UpdatingMasterConfig,
            "wait_for_data_migration" => SubTaskGroupType::WaitForDataMigration,
            "wait_for_load_balance" => SubTaskGroupType::WaitForLoadBalance,
            "removing_unused_servers" => SubTaskGroupType::RemovingUnusedServers,
            "setting_encryption_key" => SubTaskGroupType::SettingEncryptionKey,
            other => {
                return Err(CommissionerError::Validation(format!(
                    "unknown subtask group type: {other}"
                )))
            }
        };
        Ok(group_type)
    }
}

/// Top-level audit record for one submitted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: Uuid,
    pub task_name: String,
    pub task_type: TaskType,
    pub target_kind: TargetKind,
    /// Universe the run is serialized against; node tasks key on their owning universe
    pub target_id: Uuid,
    pub target_name: String,
    pub state: TaskRunState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Serialized task parameters
    pub details: serde_json::Value,
    pub error_message: Option<String>,
}

impl TaskRun {
    pub fn new(
        task_name: impl Into<String>,
        task_type: TaskType,
        target_kind: TargetKind,
        target_id: Uuid,
        target_name: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_name: task_name.into(),
            task_type,
            target_kind,
            target_id,
            target_name: target_name.into(),
            state: TaskRunState::Created,
            created_at: Utc::now(),
            completed_at: None,
            details,
            error_message: None,
        }
    }

    /// Apply a lifecycle event; terminal runs reject every further event
    pub fn transition(&mut self, event: TaskRunEvent) -> Result<TaskRunState> {
        let next = determine_target_state(self.state, &event)?;
        if let Some(message) = event.error_message() {
            self.error_message = Some(message.to_string());
        }
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.state = next;
        Ok(next)
    }

    /// e.g. "Adding Node : n3"
    pub fn friendly_description(&self) -> String {
        format!(
            "{} {} : {}",
            self.task_type.describe(self.state.is_terminal()),
            self.target_kind,
            self.target_name
        )
    }
}

/// Audit record for one scheduled subtask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTaskRun {
    pub parent_id: Uuid,
    pub position: i32,
    pub subtask_name: String,
    pub group_index: i32,
    pub group_type: SubTaskGroupType,
    pub state: TaskRunState,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SubTaskRun {
    pub fn new(
        parent_id: Uuid,
        position: i32,
        subtask_name: impl Into<String>,
        group_index: i32,
        group_type: SubTaskGroupType,
    ) -> Self {
        Self {
            parent_id,
            position,
            subtask_name: subtask_name.into(),
            group_index,
            group_type,
            state: TaskRunState::Created,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn transition(&mut self, event: TaskRunEvent) -> Result<TaskRunState> {
        let next = determine_target_state(self.state, &event)?;
        if let Some(message) = event.error_message() {
            self.error = Some(message.to_string());
        }
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.state = next;
        Ok(next)
    }
}

/// Query filter for task history, newest first
#[derive(Debug, Clone, Default)]
pub struct TaskRunFilter {
    pub target_id: Option<Uuid>,
    pub state: Option<TaskRunState>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl TaskRunFilter {
    pub fn for_target(target_id: Uuid) -> Self {
        Self {
            target_id: Some(target_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, run: &TaskRun) -> bool {
        self.target_id.map_or(true, |id| run.target_id == id)
            && self.state.map_or(true, |state| run.state == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_node_run() -> TaskRun {
        TaskRun::new(
            "AddNodeToUniverse",
            TaskType::Add,
            TargetKind::Node,
            Uuid::new_v4(),
            "n3",
            serde_json::json!({}),
        )
    }

    #[test]
    fn test_friendly_description_follows_state() {
        let mut run = add_node_run();
        assert_eq!(run.friendly_description(), "Adding Node : n3");

        run.transition(TaskRunEvent::Start).unwrap();
        run.transition(TaskRunEvent::Succeed).unwrap();
        assert_eq!(run.friendly_description(), "Added Node : n3");
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_failure_records_message_and_is_final() {
        let mut run = add_node_run();
        run.transition(TaskRunEvent::Start).unwrap();
        run.transition(TaskRunEvent::fail("master unreachable")).unwrap();
        assert_eq!(run.state, TaskRunState::Failure);
        assert_eq!(run.error_message.as_deref(), Some("master unreachable"));

        let err = run.transition(TaskRunEvent::Succeed).unwrap_err();
        assert!(matches!(err, CommissionerError::InvalidTransition { .. }));
    }

    #[test]
    fn test_filter_matching() {
        let run = add_node_run();
        assert!(TaskRunFilter::default().matches(&run));
        assert!(TaskRunFilter::for_target(run.target_id).matches(&run));
        assert!(!TaskRunFilter::for_target(Uuid::new_v4()).matches(&run));

        let running_only = TaskRunFilter {
            state: Some(TaskRunState::Running),
            ..Default::default()
        };
        assert!(!running_only.matches(&run));
    }

    #[test]
    fn test_kinds_parse_from_storage_strings() {
        assert_eq!(
            "kms_configuration".parse::<TargetKind>().unwrap(),
            TargetKind::KmsConfiguration
        );
        assert_eq!(
            "set_encryption_key".parse::<TaskType>().unwrap(),
            TaskType::SetEncryptionKey
        );
        assert_eq!(
            SubTaskGroupType::WaitForDataMigration
                .as_str()
                .parse::<SubTaskGroupType>()
                .unwrap(),
            SubTaskGroupType::WaitForDataMigration
        );
        assert!("bogus".parse::<TargetKind>().is_err());
    }
}
