pub mod native;

pub use binrelay_core::runner::{
    RunOutcome, RunnerPlugin, RunnerSession, RunnerStartArgs, Signal,
};
pub use native::NativeRunnerPlugin;
