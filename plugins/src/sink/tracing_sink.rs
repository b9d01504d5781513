use async_trait::async_trait;
use binrelay_core::api::{ExecutionLogSink, StartRecord, TerminalReport};

/// Writes execution history into the application log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

#[async_trait]
impl ExecutionLogSink for TracingLogSink {
    async fn record_start(&self, record: &StartRecord) -> anyhow::Result<()> {
        tracing::info!(
            target: "binrelay.history",
            execution_id = %record.execution_id,
            path = %record.target.display(),
            args = ?record.arguments,
            user = record.requester.as_ref().and_then(|r| r.user.as_deref()),
            "execution started"
        );
        Ok(())
    }

    async fn record_terminal(&self, report: &TerminalReport) -> anyhow::Result<()> {
        tracing::info!(
            target: "binrelay.history",
            execution_id = %report.execution_id,
            status = %report.status,
            exit_code = report.exit_code,
            output_bytes = report.output_bytes,
            truncated = report.truncated,
            duration_ms = report.duration_ms,
            "execution recorded"
        );
        Ok(())
    }
}
