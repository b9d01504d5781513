use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use binrelay_core::api::{EventsOutConfig, ExecutionLogSink, StartRecord, TerminalReport};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const STDOUT_PATH: &str = "stdout:";

/// One line of the execution history file.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum LogRecord {
    #[serde(rename = "execution.start")]
    Start(StartRecord),
    #[serde(rename = "execution.terminal")]
    Terminal(TerminalReport),
}

/// Appends one JSON object per line to a file (or stdout) from a background task.
///
/// Recording never blocks an execution when `drop_when_full` is set; dropped
/// lines are counted instead.
pub struct JsonlLogSink {
    tx: Mutex<Option<mpsc::Sender<String>>>,
    dropped: Arc<AtomicU64>,
    drop_when_full: bool,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl JsonlLogSink {
    /// Opens the destination and starts the writer. `None` when disabled.
    pub async fn start(cfg: &EventsOutConfig) -> anyhow::Result<Option<Self>> {
        if !cfg.enabled || cfg.path.trim().is_empty() {
            return Ok(None);
        }

        let mut out: Box<dyn AsyncWrite + Unpin + Send> = if cfg.path == STDOUT_PATH {
            Box::new(tokio::io::stdout())
        } else {
            if let Some(parent) = std::path::Path::new(&cfg.path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("create {}", parent.display()))?;
                }
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&cfg.path)
                .await
                .with_context(|| format!("open execution log {}", cfg.path))?;
            Box::new(file)
        };

        let (tx, mut rx) = mpsc::channel::<String>(cfg.channel_capacity.max(1));
        let path = cfg.path.clone();
        let writer = tokio::spawn(async move {
            while let Some(mut line) = rx.recv().await {
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                let written = async {
                    out.write_all(line.as_bytes()).await?;
                    out.flush().await
                };
                if let Err(e) = written.await {
                    tracing::error!(path = %path, error.kind = "sink.jsonl_write_failed", error.message = %e);
                    return;
                }
            }
            let _ = out.flush().await;
        });

        Ok(Some(Self {
            tx: Mutex::new(Some(tx)),
            dropped: Arc::new(AtomicU64::new(0)),
            drop_when_full: cfg.drop_when_full,
            writer: Mutex::new(Some(writer)),
        }))
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn sender(&self) -> anyhow::Result<mpsc::Sender<String>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| anyhow::anyhow!("execution log closed"))
    }

    async fn send(&self, record: LogRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(&record)?;
        let tx = self.sender()?;
        if self.drop_when_full {
            match tx.try_send(line) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::debug!(dropped, "execution log queue full, record dropped");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    anyhow::bail!("execution log writer stopped")
                }
            }
        } else {
            tx.send(line)
                .await
                .map_err(|_| anyhow::anyhow!("execution log writer stopped"))
        }
    }
}

#[async_trait]
impl ExecutionLogSink for JsonlLogSink {
    async fn record_start(&self, record: &StartRecord) -> anyhow::Result<()> {
        self.send(LogRecord::Start(record.clone())).await
    }

    async fn record_terminal(&self, report: &TerminalReport) -> anyhow::Result<()> {
        self.send(LogRecord::Terminal(report.clone())).await
    }

    /// Stops accepting lines and waits until everything queued is written.
    async fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                tracing::warn!(error.kind = "sink.jsonl_writer_join", error.message = %e);
            }
        }
    }
}
