use std::collections::HashMap;
use std::path::PathBuf;

/// Looks up host programs by name or path.
pub trait CapabilityProbe: Send + Sync {
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Searches `PATH` the way a shell would.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhichProbe;

impl CapabilityProbe for WhichProbe {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        match which::which(program) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::debug!(program, error = %e, "host program not found");
                None
            }
        }
    }
}

/// Fixed answers, for hosts whose capabilities are known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    programs: HashMap<String, PathBuf>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, program: &str, path: impl Into<PathBuf>) -> Self {
        self.programs.insert(program.to_string(), path.into());
        self
    }
}

impl CapabilityProbe for StaticProbe {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.programs.get(program).cloned()
    }
}
