//! Per-execution fan-out of output and status events.

mod broadcaster;
mod subscription;

pub use broadcaster::{OutputBroadcaster, Publisher};
pub use subscription::EventSubscription;
