use serde::{Deserialize, Serialize};

use crate::Resource;

/// Lifecycle state of a long-running remote operation.
///
/// `Pending -> Running -> {ClosedSuccessful | ClosedFailed}`. Any state string
/// the server invents decodes to [`TaskState::Unknown`] and is treated as still
/// in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    ClosedSuccessful,
    ClosedFailed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl TaskState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::ClosedSuccessful => "CLOSED_SUCCESSFUL",
            Self::ClosedFailed => "CLOSED_FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// No transition leaves a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ClosedSuccessful | Self::ClosedFailed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One poll response from a task status endpoint.
///
/// Every field may be missing on the wire and falls back to its zero value.
/// `result` is only meaningful in [`TaskState::ClosedSuccessful`]; the error
/// fields only in [`TaskState::ClosedFailed`]. Timestamps are opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskStatus {
    #[serde(rename = "PercentageComplete")]
    pub percentage_complete: i64,
    #[serde(rename = "RequestStateEnum")]
    pub state: TaskState,
    #[serde(rename = "ProcessDescription")]
    pub process_description: String,
    #[serde(rename = "LatestTaskDescription")]
    pub latest_task_description: String,
    #[serde(rename = "Result", skip_serializing_if = "Option::is_none")]
    pub result: Option<Resource>,
    #[serde(rename = "ErrorCode")]
    pub error_code: u64,
    #[serde(rename = "ErrorMessage")]
    pub error_message: String,
    #[serde(rename = "LastUpdatedTimestamp")]
    pub last_updated_timestamp: String,
    #[serde(rename = "CreatedTimestamp")]
    pub created_timestamp: String,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
