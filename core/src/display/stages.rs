use std::path::PathBuf;

use crate::config::DisplayConfig;
use crate::platform::CapabilityProbe;
use crate::runner::RunnerStartArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Xvfb
    Server,
    /// x11vnc
    Vnc,
    /// websockify
    Web,
}

impl StageKind {
    pub fn label(self) -> &'static str {
        match self {
            StageKind::Server => "display server",
            StageKind::Vnc => "vnc bridge",
            StageKind::Web => "web bridge",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagePlan {
    pub kind: StageKind,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl StagePlan {
    pub fn to_start_args(&self) -> RunnerStartArgs {
        RunnerStartArgs {
            cmd: self.program.to_string_lossy().to_string(),
            args: self.args.clone(),
            ..RunnerStartArgs::default()
        }
    }
}

/// Builds the startup plan for the stages whose binaries exist.
///
/// Returns `None` when the display server itself is missing.
pub fn plan(cfg: &DisplayConfig, probe: &dyn CapabilityProbe) -> Option<Vec<StagePlan>> {
    let display = cfg.display_name();
    let server = probe.locate(&cfg.server_bin)?;

    let mut stages = vec![StagePlan {
        kind: StageKind::Server,
        program: server,
        args: vec![
            display.clone(),
            "-screen".into(),
            "0".into(),
            cfg.geometry.clone(),
            "-nolisten".into(),
            "tcp".into(),
        ],
    }];

    match probe.locate(&cfg.vnc_bin) {
        Some(vnc) => stages.push(StagePlan {
            kind: StageKind::Vnc,
            program: vnc,
            args: vec![
                "-display".into(),
                display,
                "-rfbport".into(),
                cfg.vnc_port.to_string(),
                "-forever".into(),
                "-shared".into(),
                "-nopw".into(),
                "-quiet".into(),
            ],
        }),
        None => {
            tracing::info!(program = %cfg.vnc_bin, "vnc bridge not installed, display stays local");
            return Some(stages);
        }
    }

    match probe.locate(&cfg.web_bin) {
        Some(web) => {
            let mut args = Vec::new();
            if let Some(root) = cfg.web_root.as_ref().filter(|r| !r.trim().is_empty()) {
                args.push("--web".to_string());
                args.push(root.clone());
            }
            args.push(cfg.web_port.to_string());
            args.push(format!("localhost:{}", cfg.vnc_port));
            stages.push(StagePlan {
                kind: StageKind::Web,
                program: web,
                args,
            });
        }
        None => {
            tracing::info!(program = %cfg.web_bin, "web bridge not installed, skipping");
        }
    }

    Some(stages)
}
