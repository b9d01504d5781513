use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Held by an execution while it uses the display.
#[derive(Debug)]
pub struct DisplayLease {
    display: String,
    counter: Arc<AtomicUsize>,
}

impl DisplayLease {
    pub(crate) fn new(display: String, counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { display, counter }
    }

    pub fn display(&self) -> &str {
        &self.display
    }
}

impl Drop for DisplayLease {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
