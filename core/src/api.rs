//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `binrelay_core::api` instead of reaching into internal modules.

pub use crate::broadcast::{EventSubscription, OutputBroadcaster, Publisher};
pub use crate::config::{
    load_default, load_from_path, AppConfig, CompatLayerConfig, ControlConfig, DisplayConfig,
    EventsOutConfig, LimitsConfig, LoggingConfig, PlatformConfig, ValidationConfig,
};
pub use crate::context::{AppContext, Services, ServicesFactory};
pub use crate::coordinator::{
    Arguments, ExecutionCoordinator, ExecutionRequest, ExecutionSummary, Requester,
};
pub use crate::display::{DisplayAvailability, DisplayState, DisplayStatus, VirtualDisplayManager};
pub use crate::error::{
    CliError, CoordinatorError, DisplayError, ResolveError, RunnerError, ValidationError,
};
pub use crate::platform::{CapabilityProbe, CommandSpec, PlatformResolver, StaticProbe, WhichProbe};
pub use crate::runner::{
    ExecutionEvent, ExecutionStatus, LineStream, OutputEvent, RunOutcome, RunnerPlugin,
    RunnerSession, RunnerStartArgs, Signal, TerminalReport, SENTINEL_EXIT_CODE,
};
pub use crate::sink::{ExecutionLogSink, NullLogSink, StartRecord};
