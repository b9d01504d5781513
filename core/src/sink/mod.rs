//! Reporting seam towards external execution history storage.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::coordinator::Requester;
use crate::runner::TerminalReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartRecord {
    pub execution_id: String,
    pub target: PathBuf,
    pub arguments: Vec<String>,
    pub requester: Option<Requester>,
    pub started_at: DateTime<Utc>,
}

/// Receives one start record and exactly one terminal report per execution.
///
/// Errors are logged by the caller and never change the execution outcome.
#[async_trait]
pub trait ExecutionLogSink: Send + Sync {
    async fn record_start(&self, record: &StartRecord) -> anyhow::Result<()>;
    async fn record_terminal(&self, report: &TerminalReport) -> anyhow::Result<()>;

    /// Flushes anything still queued. Called once no more records can arrive.
    async fn close(&self) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogSink;

#[async_trait]
impl ExecutionLogSink for NullLogSink {
    async fn record_start(&self, _record: &StartRecord) -> anyhow::Result<()> {
        Ok(())
    }

    async fn record_terminal(&self, _report: &TerminalReport) -> anyhow::Result<()> {
        Ok(())
    }
}
