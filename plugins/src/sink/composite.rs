use std::sync::Arc;

use async_trait::async_trait;
use binrelay_core::api::{ExecutionLogSink, StartRecord, TerminalReport};

/// Forwards every record to all inner sinks.
///
/// One failing sink does not stop the others; the first error is returned.
#[derive(Clone, Default)]
pub struct CompositeLogSink {
    sinks: Vec<Arc<dyn ExecutionLogSink>>,
}

impl CompositeLogSink {
    pub fn new(sinks: Vec<Arc<dyn ExecutionLogSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn ExecutionLogSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl ExecutionLogSink for CompositeLogSink {
    async fn record_start(&self, record: &StartRecord) -> anyhow::Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record_start(record).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn record_terminal(&self, report: &TerminalReport) -> anyhow::Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record_terminal(report).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn close(&self) {
        for sink in &self.sinks {
            sink.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use binrelay_core::api::ExecutionStatus;

    use super::*;

    #[derive(Default)]
    struct Counting {
        terminals: AtomicUsize,
        closed: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ExecutionLogSink for Counting {
        async fn record_start(&self, _record: &StartRecord) -> anyhow::Result<()> {
            Ok(())
        }

        async fn record_terminal(&self, _report: &TerminalReport) -> anyhow::Result<()> {
            self.terminals.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("disk full");
            }
            Ok(())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn close_reaches_every_sink() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let sink = CompositeLogSink::new(vec![a.clone(), b.clone()]);

        sink.close().await;

        assert_eq!(a.closed.load(Ordering::SeqCst), 1);
        assert_eq!(b.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_sink_does_not_starve_the_rest() {
        let broken = Arc::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let healthy = Arc::new(Counting::default());
        let sink = CompositeLogSink::new(vec![broken.clone(), healthy.clone()]);

        let report = TerminalReport::rejected("x", ExecutionStatus::Failed, "boom".into());
        let err = sink.record_terminal(&report).await.unwrap_err();

        assert_eq!(err.to_string(), "disk full");
        assert_eq!(broken.terminals.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.terminals.load(Ordering::SeqCst), 1);
    }
}
