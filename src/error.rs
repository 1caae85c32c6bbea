//! Error types for the commissioner engine.
//!
//! The taxonomy follows how failures propagate: a subtask raises one of these,
//! its group stops, the owning task marks its run `Failure`, and the
//! commissioner exposes the message through the status query. Only the
//! convergence poller retries anything on its own.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigurationError;

/// Why an optimistic write against a universe was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// The stored version moved between read and write
    VersionMismatch { expected: i64, found: i64 },
    /// Another task holds the universe's update-in-progress flag
    UpdateInProgress,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionMismatch { expected, found } => {
                write!(f, "expected version {expected} but found {found}")
            }
            Self::UpdateInProgress => write!(f, "an update is already in progress"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommissionerError {
    #[error("Conflict on {target}: {reason}")]
    Conflict { target: Uuid, reason: ConflictReason },

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Application error: {0}")]
    ApplicationError(String),

    #[error(
        "Timeout in {operation} after {attempts} attempts ({elapsed:?}), last progress: {}",
        last_progress.as_deref().unwrap_or("none")
    )]
    Timeout {
        operation: String,
        attempts: u32,
        elapsed: Duration,
        last_progress: Option<String>,
    },

    #[error("Too many errors in {operation}: {errors} errors, last: {last_error}")]
    TooManyErrors {
        operation: String,
        errors: u32,
        last_error: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task run {0} was aborted")]
    Aborted(Uuid),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommissionerError {
    pub fn version_mismatch(target: Uuid, expected: i64, found: i64) -> Self {
        Self::Conflict {
            target,
            reason: ConflictReason::VersionMismatch { expected, found },
        }
    }

    pub fn update_in_progress(target: Uuid) -> Self {
        Self::Conflict {
            target,
            reason: ConflictReason::UpdateInProgress,
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// A lost version race may be retried with a fresh read; nothing else may.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict {
                reason: ConflictReason::VersionMismatch { .. },
                ..
            }
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Short machine-readable category, used in audit rows and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::RemoteUnavailable(_) => "remote_unavailable",
            Self::ApplicationError(_) => "application_error",
            Self::Timeout { .. } => "timeout",
            Self::TooManyErrors { .. } => "too_many_errors",
            Self::NotFound { .. } => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Validation(_) => "validation",
            Self::Aborted(_) => "aborted",
            Self::Database(_) => "database",
            Self::Configuration(_) => "configuration",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for CommissionerError {
    fn from(error: serde_json::Error) -> Self {
        CommissionerError::Serialization(error.to_string())
    }
}

impl From<sqlx::Error> for CommissionerError {
    fn from(error: sqlx::Error) -> Self {
        CommissionerError::Database(error.to_string())
    }
}

impl From<ConfigurationError> for CommissionerError {
    fn from(error: ConfigurationError) -> Self {
        CommissionerError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CommissionerError>;
