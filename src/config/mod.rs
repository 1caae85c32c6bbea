//! # Commissioner Configuration
//!
//! Typed configuration for the task engine. Values come from layered TOML files
//! and `COMMISSIONER__*` environment variables (see [`loader::ConfigManager`]);
//! every section has defaults so a partial file is enough.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use commissioner_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let threads = manager.config().executor.task_threads;
//! let data_move_delay = manager.config().data_move.wait_each_attempt();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring commissioner.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CommissionerConfig {
    /// Per-task worker pool settings
    pub executor: ExecutorConfig,

    /// Data-move completion wait
    pub data_move: PollerConfig,

    /// Load balancer settle wait
    pub load_balance: LoadBalanceConfig,

    /// Server readiness wait
    pub server_ready: ServerReadyConfig,

    /// Encryption key distribution loop
    pub encryption: EncryptionConfig,

    /// Failure alerting preferences
    pub notification: NotificationConfig,

    /// Persistence connection settings
    pub database: DatabaseConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of concurrent subtasks a single task may run
    pub task_threads: usize,
    pub shutdown_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            task_threads: 10,
            shutdown_timeout_ms: 30_000,
        }
    }
}

/// Bounds shared by every convergence wait
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerConfig {
    pub wait_each_attempt_ms: u64,
    pub max_errors_to_ignore: u32,
    pub log_every_num_iters: u32,
    pub max_wait_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            wait_each_attempt_ms: 100,
            max_errors_to_ignore: 128,
            log_every_num_iters: 100,
            max_wait_ms: 3_600_000,
        }
    }
}

impl PollerConfig {
    pub fn wait_each_attempt(&self) -> Duration {
        Duration::from_millis(self.wait_each_attempt_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalanceConfig {
    /// Sleep before the first query so the balancer has started moving load
    pub initial_delay_ms: u64,
    pub wait_each_attempt_ms: u64,
    pub max_errors_to_ignore: u32,
    pub log_every_num_iters: u32,
    pub max_wait_ms: u64,
}

impl Default for LoadBalanceConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 10_000,
            wait_each_attempt_ms: 1_000,
            max_errors_to_ignore: 128,
            log_every_num_iters: 100,
            max_wait_ms: 3_600_000,
        }
    }
}

impl LoadBalanceConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            wait_each_attempt_ms: self.wait_each_attempt_ms,
            max_errors_to_ignore: self.max_errors_to_ignore,
            log_every_num_iters: self.log_every_num_iters,
            max_wait_ms: self.max_wait_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerReadyConfig {
    pub wait_each_attempt_ms: u64,
    pub max_total_wait_ms: u64,
    pub log_every_num_iters: u32,
    /// Fallback wait when the caller gives no explicit wait time
    pub default_sleep_after_restart_ms: u64,
    pub max_errors_to_ignore: u32,
}

impl Default for ServerReadyConfig {
    fn default() -> Self {
        Self {
            wait_each_attempt_ms: 1_000,
            max_total_wait_ms: 600_000,
            log_every_num_iters: 100,
            default_sleep_after_restart_ms: 180_000,
            max_errors_to_ignore: 0,
        }
    }
}

impl ServerReadyConfig {
    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            wait_each_attempt_ms: self.wait_each_attempt_ms,
            max_errors_to_ignore: self.max_errors_to_ignore,
            log_every_num_iters: self.log_every_num_iters,
            max_wait_ms: self.max_total_wait_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncryptionConfig {
    pub key_setter_enabled: bool,
    pub key_setter_interval_ms: u64,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            key_setter_enabled: true,
            key_setter_interval_ms: 120_000,
        }
    }
}

impl EncryptionConfig {
    pub fn key_setter_interval(&self) -> Duration {
        Duration::from_millis(self.key_setter_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Alert on any failed task
    pub report_task_failures: bool,
    /// Alert on failed tasks that target a backup
    pub report_backup_failures: bool,
    pub default_email: Option<String>,
    pub send_alerts_to_default: bool,
    pub alerting_email: Option<String>,
}

impl NotificationConfig {
    /// Resolved alert recipients, default address first
    pub fn destinations(&self) -> Vec<String> {
        let mut destinations = Vec::new();
        if self.send_alerts_to_default {
            if let Some(email) = self.default_email.as_deref().filter(|e| !e.is_empty()) {
                destinations.push(email.to_string());
            }
        }
        if let Some(email) = self.alerting_email.as_deref().filter(|e| !e.is_empty()) {
            destinations.push(email.to_string());
        }
        destinations
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    /// Overrides the environment-derived level when set
    pub level: Option<String>,
}

impl CommissionerConfig {
    /// Reject settings that would leave a wait unbounded or a pool empty
    pub fn validate(&self) -> ConfigResult<()> {
        if self.executor.task_threads == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.task_threads",
                "0",
                "a task needs at least one worker",
            ));
        }

        let pollers = [
            ("data_move", self.data_move.clone()),
            ("load_balance", self.load_balance.poller()),
            ("server_ready", self.server_ready.poller()),
        ];
        for (section, poller) in pollers {
            if poller.wait_each_attempt_ms == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("{section}.wait_each_attempt_ms"),
                    "0",
                    "poll delay must be positive",
                ));
            }
            if poller.max_wait_ms == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("{section}.max_wait_ms"),
                    "0",
                    "every wait must have a finite, positive bound",
                ));
            }
        }

        if self.encryption.key_setter_enabled && self.encryption.key_setter_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "encryption.key_setter_interval_ms",
                "0",
                "interval must be positive when the key setter is enabled",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool needs at least one connection",
            ));
        }

        Ok(())
    }
}
