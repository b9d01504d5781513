use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("virtual display disabled by configuration")]
    Disabled,
    #[error("display server '{0}' not found on this host")]
    ServerUnavailable(String),
    #[error("failed to start {stage}: {source}")]
    StageSpawn {
        stage: &'static str,
        source: anyhow::Error,
    },
    #[error("{stage} exited during startup (exit code {exit_code})")]
    StageExited { stage: &'static str, exit_code: i32 },
}
