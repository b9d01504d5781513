use std::sync::Arc;

use anyhow::Result;
use binrelay_core::api::{AppConfig, CapabilityProbe, ExecutionLogSink, RunnerPlugin, WhichProbe};

use crate::runner::NativeRunnerPlugin;
use crate::sink::{CompositeLogSink, JsonlLogSink, TracingLogSink};

pub fn build_runner(_cfg: &AppConfig) -> Arc<dyn RunnerPlugin> {
    Arc::new(NativeRunnerPlugin::new())
}

pub fn build_probe(_cfg: &AppConfig) -> Arc<dyn CapabilityProbe> {
    Arc::new(WhichProbe)
}

/// Tracing history always; the JSONL file when `events_out` is enabled.
pub async fn build_log_sink(cfg: &AppConfig) -> Result<Arc<dyn ExecutionLogSink>> {
    let mut sink = CompositeLogSink::new(vec![Arc::new(TracingLogSink)]);
    if let Some(jsonl) = JsonlLogSink::start(&cfg.events_out).await? {
        sink.push(Arc::new(jsonl));
    }
    Ok(Arc::new(sink))
}
