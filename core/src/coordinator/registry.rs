use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::CoordinatorError;
use crate::runner::{ExecutionHandle, ExecutionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub target: PathBuf,
    pub status: ExecutionStatus,
    pub pid: Option<u32>,
    pub output_bytes: u64,
    pub started_at: DateTime<Utc>,
}

struct Entry {
    handle: Arc<ExecutionHandle>,
    abort_tx: mpsc::Sender<String>,
    task: Option<JoinHandle<()>>,
    finished: bool,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    finished: VecDeque<String>,
}

/// In-flight executions plus the most recently finished ones.
pub struct ExecutionRegistry {
    retain_finished: usize,
    inner: Mutex<Inner>,
}

impl ExecutionRegistry {
    pub fn new(retain_finished: usize) -> Self {
        Self {
            retain_finished,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn insert(
        &self,
        handle: Arc<ExecutionHandle>,
        abort_tx: mpsc::Sender<String>,
    ) -> Result<(), CoordinatorError> {
        let mut inner = self.lock();
        let id = handle.id().to_string();
        if inner.entries.contains_key(&id) {
            return Err(CoordinatorError::DuplicateId(id));
        }
        inner.entries.insert(
            id,
            Entry {
                handle,
                abort_tx,
                task: None,
                finished: false,
            },
        );
        Ok(())
    }

    /// A task that already finished, or whose entry was evicted, stays detached.
    pub fn attach_task(&self, execution_id: &str, task: JoinHandle<()>) {
        if let Some(entry) = self.lock().entries.get_mut(execution_id) {
            if !entry.finished {
                entry.task = Some(task);
            }
        }
    }

    pub fn get(&self, execution_id: &str) -> Option<Arc<ExecutionHandle>> {
        self.lock()
            .entries
            .get(execution_id)
            .map(|e| e.handle.clone())
    }

    pub fn abort_sender(&self, execution_id: &str) -> Option<mpsc::Sender<String>> {
        self.lock()
            .entries
            .get(execution_id)
            .map(|e| e.abort_tx.clone())
    }

    /// Moves the execution to the retained set, evicting the oldest beyond the limit.
    pub fn mark_finished(&self, execution_id: &str) {
        let mut inner = self.lock();
        if let Some(entry) = inner.entries.get_mut(execution_id) {
            entry.task = None;
            entry.finished = true;
        }
        inner.finished.push_back(execution_id.to_string());
        while inner.finished.len() > self.retain_finished {
            if let Some(old) = inner.finished.pop_front() {
                inner.entries.remove(&old);
                tracing::debug!(execution_id = %old, "evicted finished execution");
            }
        }
    }

    pub fn list(&self) -> Vec<ExecutionSummary> {
        let mut out: Vec<ExecutionSummary> = self
            .lock()
            .entries
            .values()
            .map(|e| ExecutionSummary {
                execution_id: e.handle.id().to_string(),
                target: e.handle.target().to_path_buf(),
                status: e.handle.status(),
                pid: e.handle.pid(),
                output_bytes: e.handle.output_bytes(),
                started_at: e.handle.started_at(),
            })
            .collect();
        out.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.execution_id.cmp(&b.execution_id))
        });
        out
    }

    /// Abort senders of every execution without a terminal status.
    pub fn in_flight(&self) -> Vec<(String, mpsc::Sender<String>)> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, e)| !e.handle.status().is_terminal())
            .map(|(id, e)| (id.clone(), e.abort_tx.clone()))
            .collect()
    }

    pub fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        self.lock()
            .entries
            .values_mut()
            .filter_map(|e| e.task.take())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(reg: &ExecutionRegistry, id: &str) -> Arc<ExecutionHandle> {
        let handle = ExecutionHandle::new(id, "x.exe");
        let (tx, _rx) = mpsc::channel(1);
        reg.insert(handle.clone(), tx).unwrap();
        handle
    }

    #[test]
    fn rejects_duplicate_ids() {
        let reg = ExecutionRegistry::new(4);
        add(&reg, "a");
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(
            reg.insert(ExecutionHandle::new("a", "y.exe"), tx),
            Err(CoordinatorError::DuplicateId("a".into()))
        );
    }

    #[test]
    fn evicts_oldest_finished_first() {
        let reg = ExecutionRegistry::new(2);
        for id in ["a", "b", "c"] {
            add(&reg, id);
        }
        add(&reg, "running");
        reg.mark_finished("a");
        reg.mark_finished("b");
        reg.mark_finished("c");

        assert!(reg.get("a").is_none());
        assert!(reg.get("b").is_some());
        assert!(reg.get("c").is_some());
        assert!(reg.get("running").is_some());
        assert_eq!(reg.len(), 3);
    }

    #[tokio::test]
    async fn late_attach_after_finish_is_ignored() {
        let reg = ExecutionRegistry::new(4);
        add(&reg, "fast");
        add(&reg, "slow");
        reg.mark_finished("fast");

        reg.attach_task("fast", tokio::spawn(async {}));
        reg.attach_task("slow", tokio::spawn(async {}));

        assert_eq!(reg.take_tasks().len(), 1);
    }

    #[test]
    fn in_flight_skips_terminal_executions() {
        let reg = ExecutionRegistry::new(4);
        let done = add(&reg, "done");
        add(&reg, "live");
        done.commit_terminal(crate::runner::TerminalReport::rejected(
            "done",
            ExecutionStatus::RejectedInvalid,
            "nope".into(),
        ));
        let ids: Vec<String> = reg.in_flight().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["live".to_string()]);
        assert_eq!(reg.list().len(), 2);
    }
}
