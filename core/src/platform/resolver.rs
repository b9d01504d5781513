use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::config::{CompatLayerConfig, PlatformConfig, ValidationConfig};
use crate::error::ResolveError;
use crate::runner::RunnerStartArgs;

use super::probe::CapabilityProbe;
use super::validate::{normalize_extension, TargetValidator};

/// Everything needed to spawn one target. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub target: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    pub envs: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub needs_display: bool,
    /// Name of the compatibility layer, `None` for native execution.
    pub layer: Option<String>,
}

impl CommandSpec {
    pub fn push_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
    }

    pub fn set_display(&mut self, display: &str) {
        self.envs.insert("DISPLAY".to_string(), display.to_string());
    }

    pub fn to_start_args(&self) -> RunnerStartArgs {
        RunnerStartArgs {
            cmd: self.program.clone(),
            args: self.args.clone(),
            envs: self.envs.clone(),
            cwd: self.working_dir.clone(),
        }
    }

    /// Human-readable rendering for diagnostics; not meant to be re-parsed.
    pub fn display_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(quote(&self.program));
        parts.extend(self.args.iter().map(|a| quote(a)));
        let mut envs: Vec<_> = self.envs.iter().collect();
        envs.sort();
        let prefix: Vec<String> = envs.iter().map(|(k, v)| format!("{k}={}", quote(v))).collect();
        if prefix.is_empty() {
            parts.join(" ")
        } else {
            format!("{} {}", prefix.join(" "), parts.join(" "))
        }
    }
}

fn quote(s: &str) -> String {
    if !s.is_empty() && !s.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        s.to_string()
    } else {
        format!("{s:?}")
    }
}

/// Decides how a validated target runs on this host.
pub struct PlatformResolver {
    validator: TargetValidator,
    layers: Vec<CompatLayerConfig>,
    probe: Arc<dyn CapabilityProbe>,
}

impl PlatformResolver {
    pub fn new(
        validation: &ValidationConfig,
        platform: &PlatformConfig,
        probe: Arc<dyn CapabilityProbe>,
    ) -> Self {
        Self {
            validator: TargetValidator::from_config(validation),
            layers: platform.layers.clone(),
            probe,
        }
    }

    pub fn resolve(&self, target: &Path) -> Result<CommandSpec, ResolveError> {
        let validated = self.validator.validate(target)?;
        let target_str = validated.path.to_string_lossy().to_string();

        let Some(layer) = self.layer_for(&validated.extension) else {
            tracing::debug!(path = %target_str, "running natively");
            return Ok(CommandSpec {
                target: validated.path,
                program: target_str,
                args: Vec::new(),
                envs: HashMap::new(),
                working_dir: None,
                needs_display: false,
                layer: None,
            });
        };

        let program = self.probe.locate(&layer.program).ok_or_else(|| {
            tracing::warn!(
                layer = %layer.name,
                program = %layer.program,
                error.kind = "platform.capability_unavailable",
                "compatibility layer missing"
            );
            ResolveError::CapabilityUnavailable {
                layer: layer.name.clone(),
                program: layer.program.clone(),
            }
        })?;

        let mut envs = layer.env.clone();
        if let Some(prefix) = layer.prefix.as_ref().filter(|p| !p.trim().is_empty()) {
            envs.insert("WINEPREFIX".to_string(), prefix.clone());
        }
        let mut args = layer.args.clone();
        args.push(target_str);

        Ok(CommandSpec {
            target: validated.path,
            program: program.to_string_lossy().to_string(),
            args,
            envs,
            working_dir: None,
            needs_display: layer.needs_display,
            layer: Some(layer.name.clone()),
        })
    }

    fn layer_for(&self, extension: &str) -> Option<&CompatLayerConfig> {
        self.layers.iter().find(|layer| {
            layer
                .extensions
                .iter()
                .any(|e| normalize_extension(e) == extension)
        })
    }
}
