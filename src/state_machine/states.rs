use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state shared by task runs and subtask runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunState {
    /// Persisted at submission, not yet picked up
    #[default]
    Created,
    /// Executing
    Running,
    Success,
    Failure,
    /// Stopped by an abort request before completing
    Aborted,
}

impl TaskRunState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Aborted)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TaskRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskRunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "aborted" => Ok(Self::Aborted),
            _ => Err(format!("Invalid task run state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(TaskRunState::Success.is_terminal());
        assert!(TaskRunState::Failure.is_terminal());
        assert!(TaskRunState::Aborted.is_terminal());
        assert!(!TaskRunState::Created.is_terminal());
        assert!(!TaskRunState::Running.is_terminal());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(TaskRunState::Running.to_string(), "running");
        assert_eq!("aborted".parse::<TaskRunState>().unwrap(), TaskRunState::Aborted);
        assert!("complete".parse::<TaskRunState>().is_err());
        assert_eq!(serde_json::to_string(&TaskRunState::Failure).unwrap(), "\"failure\"");
    }
}
