use std::sync::Arc;

use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::runner::{ExecutionEvent, ExecutionHandle};

/// A live view of one execution's events.
///
/// Ends after the terminal event. If the topic closes before the terminal
/// event was seen, the terminal report is taken from the handle instead.
/// Lines published before subscribing are not replayed.
pub struct EventSubscription {
    handle: Arc<ExecutionHandle>,
    rx: Option<broadcast::Receiver<ExecutionEvent>>,
    done: bool,
}

impl EventSubscription {
    pub fn new(handle: Arc<ExecutionHandle>, rx: Option<broadcast::Receiver<ExecutionEvent>>) -> Self {
        Self {
            handle,
            rx,
            done: false,
        }
    }

    pub fn execution_id(&self) -> &str {
        self.handle.id()
    }

    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        if self.done {
            return None;
        }
        while let Some(rx) = self.rx.as_mut() {
            match rx.recv().await {
                Ok(event) => {
                    if event.is_terminal() {
                        self.done = true;
                    }
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        execution_id = %self.handle.id(),
                        skipped,
                        "subscriber lagged, skipping ahead"
                    );
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                }
            }
        }
        self.done = true;
        self.handle
            .wait_terminal()
            .await
            .map(ExecutionEvent::Terminal)
    }

    pub fn into_stream(self) -> impl Stream<Item = ExecutionEvent> + Send {
        let mut sub = self;
        async_stream::stream! {
            while let Some(event) = sub.recv().await {
                yield event;
            }
        }
    }
}
