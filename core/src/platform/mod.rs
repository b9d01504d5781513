//! Target validation and host-specific command resolution.

mod probe;
mod resolver;
mod validate;

pub use probe::{CapabilityProbe, StaticProbe, WhichProbe};
pub use resolver::{CommandSpec, PlatformResolver};
pub use validate::{normalize_extension, TargetValidator, ValidatedTarget};
