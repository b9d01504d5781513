use std::process::Stdio;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

use super::{RunOutcome, RunnerPlugin, RunnerSession, RunnerStartArgs, Signal};

/// Spawns targets directly with `tokio::process`. Arguments are passed as a
/// vector, never through a shell.
///
/// On unix every child leads its own process group so signals also reach the
/// processes it starts (a compatibility layer's server, for instance).
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRunnerPlugin;

impl NativeRunnerPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RunnerPlugin for NativeRunnerPlugin {
    fn name(&self) -> &str {
        "native"
    }

    async fn start_session(&self, args: &RunnerStartArgs) -> Result<Box<dyn RunnerSession>> {
        let mut cmd = Command::new(&args.cmd);
        cmd.args(&args.args)
            .envs(&args.envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &args.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", args.cmd))?;
        tracing::debug!(program = %args.cmd, pid = child.id(), "child spawned");

        Ok(Box::new(NativeRunnerSession {
            pid: child.id(),
            child,
            started: Instant::now(),
        }))
    }
}

struct NativeRunnerSession {
    child: Child,
    pid: Option<u32>,
    started: Instant,
}

#[async_trait]
impl RunnerSession for NativeRunnerSession {
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[cfg(unix)]
    async fn signal(&mut self, signal: Signal) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal as NixSignal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Ok(());
        };
        let sig = match signal {
            Signal::Term => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
        };
        let pgid = i32::try_from(pid).context("pid out of range")?;
        match killpg(Pid::from_raw(pgid), sig) {
            // Group already gone.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to send {sig:?} to group {pgid}")),
        }
    }

    #[cfg(not(unix))]
    async fn signal(&mut self, _signal: Signal) -> Result<()> {
        // No graceful variant without a console; both signals kill.
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn wait(&mut self) -> Result<RunOutcome> {
        let status = self.child.wait().await?;
        Ok(self.outcome(&status))
    }

    fn try_wait(&mut self) -> Result<Option<RunOutcome>> {
        let status = self.child.try_wait()?;
        Ok(status.map(|s| self.outcome(&s)))
    }
}

impl NativeRunnerSession {
    fn outcome(&self, status: &std::process::ExitStatus) -> RunOutcome {
        RunOutcome {
            exit_code: exit_code(status),
            duration_ms: Some(self.started.elapsed().as_millis() as u64),
        }
    }
}

/// Signal deaths map to `128 + signo`, as a shell reports them.
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;

    fn sh(script: &str) -> RunnerStartArgs {
        RunnerStartArgs {
            cmd: "sh".into(),
            args: vec!["-c".into(), script.into()],
            ..RunnerStartArgs::default()
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let mut session = NativeRunnerPlugin::new()
            .start_session(&sh("echo hello; exit 3"))
            .await
            .unwrap();
        let mut out = String::new();
        session
            .stdout()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        let outcome = session.wait().await.unwrap();

        assert_eq!(out, "hello\n");
        assert_eq!(outcome.exit_code, 3);
        assert!(session.pid().is_some());
    }

    #[tokio::test]
    async fn term_reports_signal_exit_code() {
        let mut session = NativeRunnerPlugin::new()
            .start_session(&sh("sleep 30"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.signal(Signal::Term).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), session.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.exit_code, 128 + 15);
    }

    #[tokio::test]
    async fn signalling_an_exited_child_is_not_an_error() {
        let mut session = NativeRunnerPlugin::new()
            .start_session(&sh("exit 0"))
            .await
            .unwrap();
        session.wait().await.unwrap();
        session.signal(Signal::Kill).await.unwrap();
    }

    #[tokio::test]
    async fn try_wait_sees_exit_without_blocking() {
        let mut session = NativeRunnerPlugin::new()
            .start_session(&sh("sleep 30"))
            .await
            .unwrap();
        assert!(session.try_wait().unwrap().is_none());

        session.signal(Signal::Kill).await.unwrap();
        session.wait().await.unwrap();
        assert_eq!(session.try_wait().unwrap().unwrap().exit_code, 128 + 9);
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let err = NativeRunnerPlugin::new()
            .start_session(&RunnerStartArgs {
                cmd: "/definitely/not/here".into(),
                ..RunnerStartArgs::default()
            })
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn passes_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = sh("echo \"$GREETING\"; pwd");
        args.envs.insert("GREETING".into(), "hi".into());
        args.cwd = Some(dir.path().to_path_buf());

        let mut session = NativeRunnerPlugin::new().start_session(&args).await.unwrap();
        let mut out = String::new();
        session
            .stdout()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        session.wait().await.unwrap();

        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("hi"));
        let cwd = std::path::PathBuf::from(lines.next().unwrap());
        assert_eq!(
            cwd.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
