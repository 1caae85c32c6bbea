//! # Failure Notification
//!
//! Best-effort alerting when a task fails. Delivery errors are logged by the
//! caller and never replace the task's own failure.
//!
//! ```rust
//! use commissioner_core::notification::{LoggingNotifier, Notifier, TASK_FAILURE_ALERT};
//!
//! # tokio_test::block_on(async {
//! let payload = serde_json::json!({ "alert_name": "RemoveNodeFromUniverse failed" });
//! LoggingNotifier
//!     .send(TASK_FAILURE_ALERT, &["ops@example.com".to_string()], &payload)
//!     .await
//!     .unwrap();
//! # });
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::NotificationConfig;
use crate::error::Result;
use crate::models::{TargetKind, TaskRun};

pub const TASK_FAILURE_ALERT: &str = "task_failure";

/// Delivery collaborator (mail, webhook, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        tag: &str,
        destinations: &[String],
        template_data: &serde_json::Value,
    ) -> Result<()>;
}

/// Default notifier that only writes the alert to the log
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(
        &self,
        tag: &str,
        destinations: &[String],
        template_data: &serde_json::Value,
    ) -> Result<()> {
        info!(
            tag = %tag,
            destinations = ?destinations,
            payload = %template_data,
            "📣 NOTIFICATION"
        );
        Ok(())
    }
}

/// Template payload for a failed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureNotification {
    pub alert_name: String,
    pub task_type: String,
    pub target_type: String,
    pub target_name: String,
    pub task_info: String,
}

impl FailureNotification {
    pub fn from_run(run: &TaskRun) -> Self {
        Self {
            alert_name: format!("{} failed", run.task_name),
            task_type: run.task_type.as_str().to_string(),
            target_type: run.target_kind.to_string(),
            target_name: run.target_name.clone(),
            task_info: run
                .error_message
                .clone()
                .unwrap_or_else(|| "no error details".to_string()),
        }
    }

    pub fn template_data(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Whether the alerting preferences ask for a failure of this run to be reported
pub fn should_report_failure(config: &NotificationConfig, run: &TaskRun) -> bool {
    if config.destinations().is_empty() {
        return false;
    }
    config.report_task_failures
        || (config.report_backup_failures && run.target_kind == TargetKind::Backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskType;
    use crate::state_machine::TaskRunEvent;
    use uuid::Uuid;

    fn failed_run(kind: TargetKind) -> TaskRun {
        let mut run = TaskRun::new(
            "RemoveNodeFromUniverse",
            TaskType::Remove,
            kind,
            Uuid::new_v4(),
            "n2",
            serde_json::json!({}),
        );
        run.transition(TaskRunEvent::fail("data move timed out"))
            .unwrap();
        run
    }

    fn alerting(report_task_failures: bool, report_backup_failures: bool) -> NotificationConfig {
        NotificationConfig {
            report_task_failures,
            report_backup_failures,
            alerting_email: Some("team@example.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload = FailureNotification::from_run(&failed_run(TargetKind::Node));
        assert_eq!(payload.alert_name, "RemoveNodeFromUniverse failed");
        assert_eq!(payload.target_type, "Node");
        assert_eq!(payload.target_name, "n2");
        assert_eq!(payload.task_info, "data move timed out");

        let data = payload.template_data().unwrap();
        assert_eq!(data["task_type"], "remove");
    }

    #[test]
    fn test_reporting_preferences() {
        let node_failure = failed_run(TargetKind::Node);
        let backup_failure = failed_run(TargetKind::Backup);

        assert!(should_report_failure(&alerting(true, false), &node_failure));
        assert!(!should_report_failure(&alerting(false, true), &node_failure));
        assert!(should_report_failure(&alerting(false, true), &backup_failure));
        assert!(!should_report_failure(&NotificationConfig {
            report_task_failures: true,
            ..Default::default()
        }, &node_failure));
    }
}
