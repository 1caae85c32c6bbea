use serde::{Deserialize, Serialize};

/// Events that can trigger task-run state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskRunEvent {
    Start,
    Succeed,
    /// Failure with its error message
    Fail(String),
    Abort,
}

impl TaskRunEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Succeed => "succeed",
            Self::Fail(_) => "fail",
            Self::Abort => "abort",
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}
