//! Entry point: accepts requests and drives each execution to its terminal report.

#[allow(clippy::module_inception)]
mod coordinator;
mod registry;
mod request;

pub use coordinator::ExecutionCoordinator;
pub use registry::{ExecutionRegistry, ExecutionSummary};
pub use request::{Arguments, ExecutionRequest, Requester};
