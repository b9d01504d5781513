//! Shared off-screen display for GUI binaries run under a compatibility layer.

mod lease;
mod manager;
mod stages;

pub use lease::DisplayLease;
pub use manager::{DisplayAvailability, DisplayState, DisplayStatus, VirtualDisplayManager};
pub use stages::{StageKind, StagePlan};
