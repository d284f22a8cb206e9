//! Task domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Durable record of one pipeline handler's last execution for a plan
///
/// Unique per `(plan_id, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub plan_id: i64,
    /// Handler identity
    pub name: String,
    pub step: TaskStep,
    pub status: TaskStatus,
    pub message: String,
    pub resource_version: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Where a handler is in the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStep {
    NotStarted,
    Running,
    Failed,
    Completed,
}

/// Outcome of the handler's last execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Row created, handler has not reported yet
    Pending,
    Success,
    Failed,
}

/// Request to create a task row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub plan_id: i64,
    pub name: String,
    pub step: TaskStep,
    pub status: TaskStatus,
    pub message: String,
}

/// Partial update of a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub step: Option<TaskStep>,
    pub status: Option<TaskStatus>,
    pub message: Option<String>,
}

impl TaskStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStep::NotStarted => "NotStarted",
            TaskStep::Running => "Running",
            TaskStep::Failed => "Failed",
            TaskStep::Completed => "Completed",
        }
    }
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotStarted" => Ok(TaskStep::NotStarted),
            "Running" => Ok(TaskStep::Running),
            "Failed" => Ok(TaskStep::Failed),
            "Completed" => Ok(TaskStep::Completed),
            other => Err(format!("unknown task step '{}'", other)),
        }
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Success => "Success",
            TaskStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(TaskStatus::Pending),
            "Success" => Ok(TaskStatus::Success),
            "Failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_string_round_trip() {
        for step in [
            TaskStep::NotStarted,
            TaskStep::Running,
            TaskStep::Failed,
            TaskStep::Completed,
        ] {
            assert_eq!(step.as_str().parse::<TaskStep>(), Ok(step));
        }
        assert!("Done".parse::<TaskStep>().is_err());
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert_eq!("Success".parse::<TaskStatus>(), Ok(TaskStatus::Success));
        assert!("success".parse::<TaskStatus>().is_err());
    }
}
