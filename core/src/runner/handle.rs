use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::transitions::StatusTransition;
use super::types::{ExecutionStatus, TerminalReport};

/// Live state of one execution.
///
/// Only the owning execution task mutates it; everything else reads. The
/// terminal report is write-once: the first committer wins and later
/// attempts are ignored.
pub struct ExecutionHandle {
    id: String,
    target: PathBuf,
    started_at: DateTime<Utc>,
    status_tx: watch::Sender<ExecutionStatus>,
    pid: AtomicU32,
    output_bytes: AtomicU64,
    lines: AtomicU64,
    terminal: OnceLock<TerminalReport>,
}

impl ExecutionHandle {
    pub fn new(id: impl Into<String>, target: impl Into<PathBuf>) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ExecutionStatus::Starting);
        Arc::new(Self {
            id: id.into(),
            target: target.into(),
            started_at: Utc::now(),
            status_tx,
            pid: AtomicU32::new(0),
            output_bytes: AtomicU64::new(0),
            lines: AtomicU64::new(0),
            terminal: OnceLock::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> ExecutionStatus {
        *self.status_tx.borrow()
    }

    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    pub fn output_bytes(&self) -> u64 {
        self.output_bytes.load(Ordering::Relaxed)
    }

    pub fn lines_emitted(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    pub fn terminal(&self) -> Option<&TerminalReport> {
        self.terminal.get()
    }

    pub fn watch_status(&self) -> watch::Receiver<ExecutionStatus> {
        self.status_tx.subscribe()
    }

    /// Resolves once a terminal report has been committed.
    pub async fn wait_terminal(&self) -> Option<TerminalReport> {
        let mut rx = self.status_tx.subscribe();
        // The sender lives in `self`, so this only fails if the handle is gone.
        let _ = rx.wait_for(|s| s.is_terminal()).await;
        self.terminal.get().cloned()
    }

    pub(crate) fn mark_running(&self, pid: Option<u32>) -> bool {
        if let Some(pid) = pid {
            self.pid.store(pid, Ordering::Release);
        }
        self.transition(ExecutionStatus::Running)
    }

    pub(crate) fn record_line(&self, bytes: u64) {
        self.output_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Stores the terminal report. Returns false when another report won.
    pub(crate) fn commit_terminal(&self, report: TerminalReport) -> bool {
        let status = report.status;
        if self.terminal.set(report).is_err() {
            tracing::debug!(execution_id = %self.id, attempted = %status, "terminal status already committed");
            return false;
        }
        self.status_tx.send_replace(status);
        true
    }

    fn transition(&self, to: ExecutionStatus) -> bool {
        let mut applied = false;
        self.status_tx.send_if_modified(|current| {
            match StatusTransition::validate(*current, to) {
                Ok(()) => {
                    *current = to;
                    applied = true;
                    true
                }
                Err(e) => {
                    tracing::debug!(execution_id = %self.id, error = %e, "status transition ignored");
                    false
                }
            }
        });
        applied
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("status", &self.status())
            .field("pid", &self.pid())
            .finish()
    }
}
