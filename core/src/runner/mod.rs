mod abort;
mod events;
mod handle;
mod io_pump;
mod output;
mod runtime;
mod traits;
mod transitions;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use abort::{terminate_then_kill, TerminationResult};
pub use events::{ExecutionEvent, LineStream, OutputEvent};
pub use handle::ExecutionHandle;
pub use io_pump::LineDecoder;
pub use output::OutputLog;
pub use runtime::{ProcessSupervisor, SupervisorOptions};
pub use traits::{RunnerPlugin, RunnerSession};
pub use transitions::{StatusTransition, TransitionError};
pub use types::{
    ExecutionLimits, ExecutionStatus, RunOutcome, RunnerStartArgs, Signal, TerminalReport,
    SENTINEL_EXIT_CODE,
};
