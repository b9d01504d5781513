use std::path::{Path, PathBuf};

use crate::config::ValidationConfig;
use crate::error::ValidationError;

/// Lowercases and adds the leading dot: `"EXE"` becomes `".exe"`.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTarget {
    pub path: PathBuf,
    /// Normalized, e.g. ".exe".
    pub extension: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct TargetValidator {
    allowed: Vec<String>,
    max_file_size: u64,
}

impl TargetValidator {
    pub fn new(allowed: &[String], max_file_size: u64) -> Self {
        Self {
            allowed: allowed.iter().map(|e| normalize_extension(e)).collect(),
            max_file_size,
        }
    }

    pub fn from_config(cfg: &ValidationConfig) -> Self {
        Self::new(&cfg.allowed_extensions, cfg.max_file_size)
    }

    /// The returned path is absolute, so the file that was checked is the one
    /// that gets spawned regardless of `PATH` or a later working directory.
    pub fn validate(&self, path: &Path) -> Result<ValidatedTarget, ValidationError> {
        let io_error = |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::NotFound => ValidationError::NotFound(path.to_path_buf()),
            _ => ValidationError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            },
        };
        let meta = std::fs::metadata(path).map_err(io_error)?;
        if !meta.is_file() {
            return Err(ValidationError::NotAFile(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .map(|e| normalize_extension(&e.to_string_lossy()))
            .unwrap_or_default();
        if extension.is_empty() || !self.allowed.contains(&extension) {
            return Err(ValidationError::ExtensionNotAllowed {
                path: path.to_path_buf(),
                extension,
                allowed: self.allowed.clone(),
            });
        }

        if meta.len() > self.max_file_size {
            return Err(ValidationError::TooLarge {
                path: path.to_path_buf(),
                size: meta.len(),
                max: self.max_file_size,
            });
        }

        let absolute = std::fs::canonicalize(path).map_err(io_error)?;
        Ok(ValidatedTarget {
            path: absolute,
            extension,
            size: meta.len(),
        })
    }
}
