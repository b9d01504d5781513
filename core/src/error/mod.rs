#[allow(clippy::module_inception)]
pub mod error;
pub mod coordinator;
pub mod display;
pub mod platform;

pub use coordinator::CoordinatorError;
pub use display::DisplayError;
pub use error::{CliError, RunnerError};
pub use platform::{ResolveError, ValidationError};
