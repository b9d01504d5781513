use std::path::PathBuf;

use thiserror::Error;

use crate::runner::ExecutionStatus;

/// Reasons a target file is refused before anything is spawned.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("target not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("target is not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("extension {extension:?} not allowed for {} (allowed: {})", path.display(), allowed.join(", "))]
    ExtensionNotAllowed {
        path: PathBuf,
        extension: String,
        allowed: Vec<String>,
    },
    #[error("target {} is {size} bytes, limit is {max}", path.display())]
    TooLarge { path: PathBuf, size: u64, max: u64 },
    #[error("cannot inspect {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("compatibility layer '{layer}' ({program}) is not available on this host")]
    CapabilityUnavailable { layer: String, program: String },
}

impl ResolveError {
    /// Terminal status an execution ends in when resolution fails this way.
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Invalid(_) => ExecutionStatus::RejectedInvalid,
            Self::CapabilityUnavailable { .. } => ExecutionStatus::CapabilityUnavailable,
        }
    }
}
