use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code reported when no real exit code could be observed (timeout,
/// external kill, spawn failure).
pub const SENTINEL_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Kill,
    Term,
}

#[derive(Debug, Clone, Default)]
pub struct RunnerStartArgs {
    pub cmd: String,
    pub args: Vec<String>,
    pub envs: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Starting,
    Running,
    Completed,
    Failed,
    TimedOut,
    RejectedInvalid,
    CapabilityUnavailable,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Starting | ExecutionStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Starting => "starting",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::TimedOut => "timed_out",
            ExecutionStatus::RejectedInvalid => "rejected_invalid",
            ExecutionStatus::CapabilityUnavailable => "capability_unavailable",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits applied to a single execution after defaults have been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub max_output_bytes: u64,
}

/// Final outcome of one execution. Exactly one is produced per execution id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalReport {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub message: String,
    pub output: String,
    pub truncated: bool,
    pub output_bytes: u64,
    pub duration_ms: u64,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl TerminalReport {
    /// Report for an execution that never reached process creation.
    pub fn rejected(execution_id: &str, status: ExecutionStatus, message: String) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            status,
            success: false,
            exit_code: None,
            message,
            output: String::new(),
            truncated: false,
            output_bytes: 0,
            duration_ms: 0,
            finished_at: chrono::Utc::now(),
        }
    }
}
