use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::runner::{ExecutionEvent, ExecutionStatus};

/// Sending half for one execution topic.
#[derive(Clone)]
pub struct Publisher {
    execution_id: String,
    tx: broadcast::Sender<ExecutionEvent>,
}

impl Publisher {
    /// A publisher nobody listens to yet.
    pub fn detached(execution_id: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            execution_id: execution_id.into(),
            tx,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Never blocks. Returns the number of subscribers that received it.
    pub fn publish(&self, event: ExecutionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn status(&self, status: ExecutionStatus, message: impl Into<String>) -> usize {
        self.publish(ExecutionEvent::Status {
            execution_id: self.execution_id.clone(),
            status,
            message: message.into(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }
}

/// Registry of open topics, keyed by `execution_{id}`.
pub struct OutputBroadcaster {
    capacity: usize,
    topics: Mutex<HashMap<String, Publisher>>,
}

impl OutputBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }

    pub fn topic(execution_id: &str) -> String {
        format!("execution_{execution_id}")
    }

    /// Opens the topic for `execution_id`, or returns the already open one.
    pub fn open(&self, execution_id: &str) -> Publisher {
        self.lock()
            .entry(Self::topic(execution_id))
            .or_insert_with(|| Publisher::detached(execution_id, self.capacity))
            .clone()
    }

    /// Events for unknown or subscriber-less topics are dropped.
    pub fn publish(&self, execution_id: &str, event: ExecutionEvent) -> usize {
        let publisher = self.lock().get(&Self::topic(execution_id)).cloned();
        match publisher {
            Some(p) => p.publish(event),
            None => 0,
        }
    }

    pub fn subscribe(&self, execution_id: &str) -> Option<broadcast::Receiver<ExecutionEvent>> {
        self.lock()
            .get(&Self::topic(execution_id))
            .map(Publisher::subscribe)
    }

    /// Removes the topic. Receivers see `Closed` once every outstanding
    /// publisher clone is dropped.
    pub fn close(&self, execution_id: &str) {
        if self.lock().remove(&Self::topic(execution_id)).is_some() {
            tracing::debug!(execution_id, "broadcast topic closed");
        }
    }

    pub fn subscriber_count(&self, execution_id: &str) -> usize {
        self.lock()
            .get(&Self::topic(execution_id))
            .map(|p| p.tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn open_topics(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Publisher>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
