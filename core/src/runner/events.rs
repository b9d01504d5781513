use serde::{Deserialize, Serialize};

use super::types::{ExecutionStatus, TerminalReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LineStream {
    Stdout,
    Stderr,
    /// Informational notices produced by the supervisor itself.
    System,
}

impl LineStream {
    pub fn label(self) -> &'static str {
        match self {
            LineStream::Stdout => "STDOUT",
            LineStream::Stderr => "STDERR",
            LineStream::System => "SYSTEM",
        }
    }
}

/// One line of output, numbered within its execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub execution_id: String,
    pub seq: u64,
    pub stream: LineStream,
    pub line: String,
}

impl OutputEvent {
    pub fn render(&self) -> String {
        format!("{}: {}", self.stream.label(), self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Status {
        execution_id: String,
        status: ExecutionStatus,
        message: String,
    },
    Output(OutputEvent),
    Terminal(TerminalReport),
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            ExecutionEvent::Status { execution_id, .. } => execution_id,
            ExecutionEvent::Output(ev) => &ev.execution_id,
            ExecutionEvent::Terminal(report) => &report.execution_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionEvent::Terminal(_))
    }
}
