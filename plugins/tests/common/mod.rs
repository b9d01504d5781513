use std::path::{Path, PathBuf};
use std::sync::Arc;

use binrelay_core::api::{
    AppConfig, CompatLayerConfig, ExecutionCoordinator, ExecutionLogSink, NullLogSink, Services,
    WhichProbe,
};
use binrelay_plugins::runner::NativeRunnerPlugin;

/// Scripts with a `.sh` extension run through `sh`, standing in for a compatibility layer.
pub fn shell_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.validation.allowed_extensions = vec![".sh".into(), ".exe".into()];
    cfg.platform.layers = vec![
        CompatLayerConfig {
            name: "shell".into(),
            program: "sh".into(),
            args: vec![],
            extensions: vec![".sh".into()],
            needs_display: false,
            env: Default::default(),
            prefix: None,
        },
        CompatLayerConfig {
            name: "wine".into(),
            program: "binrelay-test-missing-wine".into(),
            args: vec![],
            extensions: vec![".exe".into()],
            needs_display: true,
            env: Default::default(),
            prefix: None,
        },
    ];
    cfg.display.enabled = false;
    cfg.events_out.enabled = false;
    cfg.control.terminate_grace_ms = 500;
    cfg.control.drain_timeout_ms = 500;
    cfg
}

pub fn coordinator(cfg: &AppConfig) -> ExecutionCoordinator {
    coordinator_with_sink(cfg, Arc::new(NullLogSink))
}

pub fn coordinator_with_sink(
    cfg: &AppConfig,
    log_sink: Arc<dyn ExecutionLogSink>,
) -> ExecutionCoordinator {
    let services = Services {
        runner: Arc::new(NativeRunnerPlugin::new()),
        probe: Arc::new(WhichProbe),
        log_sink,
    };
    ExecutionCoordinator::new(cfg, services).expect("coordinator")
}

pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    path
}

pub fn executable(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = script(dir, name, body);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}
