use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::runner::ExecutionLimits;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub events_out: EventsOutConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.limits.timeout_secs == 0 {
            return Err(RunnerError::Config("limits.timeout_secs must be > 0".into()));
        }
        if self.limits.max_output_bytes == 0 {
            return Err(RunnerError::Config(
                "limits.max_output_bytes must be > 0".into(),
            ));
        }
        if self.validation.allowed_extensions.is_empty() {
            return Err(RunnerError::Config(
                "validation.allowed_extensions must not be empty".into(),
            ));
        }
        if self.control.line_channel_capacity == 0 || self.broadcast.channel_capacity == 0 {
            return Err(RunnerError::Config("channel capacities must be > 0".into()));
        }
        for layer in &self.platform.layers {
            if layer.program.trim().is_empty() {
                return Err(RunnerError::Config(format!(
                    "platform layer '{}' has no program",
                    layer.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "binrelay_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Defaults applied when a request does not carry its own limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_output_bytes() -> u64 {
    1024 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl LimitsConfig {
    pub fn resolve(&self, timeout_secs: Option<u64>, max_output_bytes: Option<u64>) -> ExecutionLimits {
        ExecutionLimits {
            timeout: Duration::from_secs(timeout_secs.unwrap_or(self.timeout_secs)),
            max_output_bytes: max_output_bytes.unwrap_or(self.max_output_bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Time between SIGTERM and SIGKILL.
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,

    /// How long to keep reading pipes after the child exited.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    #[serde(default = "default_line_channel_capacity")]
    pub line_channel_capacity: usize,

    /// Any ASCII-compatible WHATWG label, e.g. "utf-8" or "windows-1252".
    #[serde(default = "default_output_encoding")]
    pub output_encoding: String,

    /// Finished executions kept for status queries.
    #[serde(default = "default_retain_finished")]
    pub retain_finished: usize,
}

fn default_terminate_grace_ms() -> u64 {
    3_000
}

fn default_drain_timeout_ms() -> u64 {
    2_000
}

fn default_line_channel_capacity() -> usize {
    1024
}

fn default_output_encoding() -> String {
    "utf-8".to_string()
}

fn default_retain_finished() -> usize {
    256
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            terminate_grace_ms: default_terminate_grace_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            line_channel_capacity: default_line_channel_capacity(),
            output_encoding: default_output_encoding(),
            retain_finished: default_retain_finished(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_allowed_extensions() -> Vec<String> {
    vec![".exe".to_string()]
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            max_file_size: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Extensions that are not listed by any layer run natively.
    #[serde(default = "default_layers")]
    pub layers: Vec<CompatLayerConfig>,
}

/// A program that runs foreign binaries, e.g. `wine app.exe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatLayerConfig {
    pub name: String,
    pub program: String,

    /// Arguments placed between the layer program and the target.
    #[serde(default)]
    pub args: Vec<String>,

    pub extensions: Vec<String>,

    #[serde(default)]
    pub needs_display: bool,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Exported as WINEPREFIX when set.
    #[serde(default)]
    pub prefix: Option<String>,
}

fn default_layers() -> Vec<CompatLayerConfig> {
    if cfg!(windows) {
        return Vec::new();
    }
    vec![CompatLayerConfig {
        name: "wine".to_string(),
        program: "wine".to_string(),
        args: Vec::new(),
        extensions: vec![".exe".to_string(), ".com".to_string(), ".msi".to_string()],
        needs_display: true,
        env: HashMap::from([("WINEDEBUG".to_string(), "-all".to_string())]),
        prefix: None,
    }]
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            layers: default_layers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_enabled")]
    pub enabled: bool,

    #[serde(default = "default_display_number")]
    pub display_number: u32,

    #[serde(default = "default_geometry")]
    pub geometry: String,

    #[serde(default = "default_vnc_port")]
    pub vnc_port: u16,

    #[serde(default = "default_web_port")]
    pub web_port: u16,

    #[serde(default = "default_server_bin")]
    pub server_bin: String,

    #[serde(default = "default_vnc_bin")]
    pub vnc_bin: String,

    #[serde(default = "default_web_bin")]
    pub web_bin: String,

    /// Static web client served by the web bridge (e.g. noVNC).
    #[serde(default)]
    pub web_root: Option<String>,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_display_enabled() -> bool {
    true
}

fn default_display_number() -> u32 {
    99
}

fn default_geometry() -> String {
    "1280x800x24".to_string()
}

fn default_vnc_port() -> u16 {
    5900
}

fn default_web_port() -> u16 {
    6080
}

fn default_server_bin() -> String {
    "Xvfb".to_string()
}

fn default_vnc_bin() -> String {
    "x11vnc".to_string()
}

fn default_web_bin() -> String {
    "websockify".to_string()
}

fn default_settle_ms() -> u64 {
    500
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: default_display_enabled(),
            display_number: default_display_number(),
            geometry: default_geometry(),
            vnc_port: default_vnc_port(),
            web_port: default_web_port(),
            server_bin: default_server_bin(),
            vnc_bin: default_vnc_bin(),
            web_bin: default_web_bin(),
            web_root: None,
            settle_ms: default_settle_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl DisplayConfig {
    /// Value for the `DISPLAY` variable, e.g. ":99".
    pub fn display_name(&self) -> String {
        format!(":{}", self.display_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_broadcast_capacity")]
    pub channel_capacity: usize,
}

fn default_broadcast_capacity() -> usize {
    1024
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsOutConfig {
    pub enabled: bool,
    pub path: String,
    pub channel_capacity: usize,
    pub drop_when_full: bool,
}

impl Default for EventsOutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "./executions.jsonl".to_string(),
            channel_capacity: 2048,
            drop_when_full: true,
        }
    }
}
