//! In-process fakes for the runner seam, shared by unit tests across the crate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream};
use tokio::sync::watch;

use super::events::LineStream;
use super::traits::{RunnerPlugin, RunnerSession};
use super::types::{RunOutcome, RunnerStartArgs, Signal};

#[derive(Debug, Clone, Copy)]
pub enum FakeBehavior {
    ExitOnTerm(i32),
    IgnoreTerm,
    TermErrors,
}

#[derive(Clone)]
pub struct FakeProbe {
    inner: Arc<ProbeInner>,
}

struct ProbeInner {
    signals: Mutex<Vec<Signal>>,
    exit_tx: watch::Sender<Option<i32>>,
    stdout: tokio::sync::Mutex<Option<DuplexStream>>,
    stderr: tokio::sync::Mutex<Option<DuplexStream>>,
}

impl FakeProbe {
    pub fn signals(&self) -> Vec<Signal> {
        self.inner.signals.lock().unwrap().clone()
    }

    pub fn has_exited(&self) -> bool {
        self.inner.exit_tx.borrow().is_some()
    }

    pub async fn write(&self, stream: LineStream, data: &[u8]) {
        let slot = match stream {
            LineStream::Stderr => &self.inner.stderr,
            _ => &self.inner.stdout,
        };
        if let Some(w) = slot.lock().await.as_mut() {
            let _ = w.write_all(data).await;
        }
    }

    pub async fn close_streams(&self) {
        self.inner.stdout.lock().await.take();
        self.inner.stderr.lock().await.take();
    }

    pub async fn exit(&self, code: i32) {
        self.close_streams().await;
        self.inner.exit_tx.send_replace(Some(code));
    }

    /// Exit without closing the pipes, like a child whose grandchild keeps them open.
    pub fn exit_keep_streams(&self, code: i32) {
        self.inner.exit_tx.send_replace(Some(code));
    }
}

pub struct FakeSession {
    behavior: FakeBehavior,
    probe: FakeProbe,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    exit_rx: watch::Receiver<Option<i32>>,
}

impl FakeSession {
    pub fn new(behavior: FakeBehavior) -> (Self, FakeProbe) {
        let (out_w, out_r) = tokio::io::duplex(64 * 1024);
        let (err_w, err_r) = tokio::io::duplex(64 * 1024);
        let (exit_tx, exit_rx) = watch::channel(None);
        let probe = FakeProbe {
            inner: Arc::new(ProbeInner {
                signals: Mutex::new(Vec::new()),
                exit_tx,
                stdout: tokio::sync::Mutex::new(Some(out_w)),
                stderr: tokio::sync::Mutex::new(Some(err_w)),
            }),
        };
        let session = Self {
            behavior,
            probe: probe.clone(),
            stdout: Some(out_r),
            stderr: Some(err_r),
            exit_rx,
        };
        (session, probe)
    }
}

#[async_trait]
impl RunnerSession for FakeSession {
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    async fn signal(&mut self, signal: Signal) -> anyhow::Result<()> {
        self.probe.inner.signals.lock().unwrap().push(signal);
        match (signal, self.behavior) {
            (Signal::Kill, _) => {
                self.probe.exit(137).await;
                Ok(())
            }
            (Signal::Term, FakeBehavior::ExitOnTerm(code)) => {
                self.probe.exit(code).await;
                Ok(())
            }
            (Signal::Term, FakeBehavior::IgnoreTerm) => Ok(()),
            (Signal::Term, FakeBehavior::TermErrors) => anyhow::bail!("no such process"),
        }
    }

    fn try_wait(&mut self) -> anyhow::Result<Option<RunOutcome>> {
        Ok((*self.exit_rx.borrow()).map(|code| RunOutcome {
            exit_code: code,
            duration_ms: None,
        }))
    }

    async fn wait(&mut self) -> anyhow::Result<RunOutcome> {
        let code = {
            let v = self.exit_rx.wait_for(|c| c.is_some()).await?;
            (*v).unwrap_or(-1)
        };
        Ok(RunOutcome {
            exit_code: code,
            duration_ms: None,
        })
    }
}

/// What a spawned fake does on its own once started.
#[derive(Debug, Clone)]
pub enum FakeScript {
    /// Stays alive until signalled or driven through its probe.
    Idle,
    /// Writes the lines, then exits with the code.
    Lines {
        lines: Vec<(LineStream, String)>,
        exit_code: i32,
    },
    /// Exits right away; used to model display stages that die on startup.
    ExitImmediately(i32),
}

#[derive(Clone)]
pub struct FakeRunner {
    inner: Arc<FakeRunnerInner>,
}

struct FakeRunnerInner {
    behavior: FakeBehavior,
    script: FakeScript,
    start_delay: Duration,
    fail_programs: Vec<String>,
    exit_programs: Vec<String>,
    started: Mutex<Vec<RunnerStartArgs>>,
    probes: Mutex<Vec<FakeProbe>>,
}

impl FakeRunner {
    pub fn new(behavior: FakeBehavior, script: FakeScript) -> Self {
        Self::build(behavior, script, Duration::ZERO, vec![], vec![])
    }

    pub fn build(
        behavior: FakeBehavior,
        script: FakeScript,
        start_delay: Duration,
        fail_programs: Vec<String>,
        exit_programs: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(FakeRunnerInner {
                behavior,
                script,
                start_delay,
                fail_programs,
                exit_programs,
                started: Mutex::new(Vec::new()),
                probes: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn started(&self) -> Vec<RunnerStartArgs> {
        self.inner.started.lock().unwrap().clone()
    }

    pub fn started_programs(&self) -> Vec<String> {
        self.started().into_iter().map(|a| a.cmd).collect()
    }

    pub fn probes(&self) -> Vec<FakeProbe> {
        self.inner.probes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunnerPlugin for FakeRunner {
    fn name(&self) -> &str {
        "fake"
    }

    async fn start_session(&self, args: &RunnerStartArgs) -> anyhow::Result<Box<dyn RunnerSession>> {
        if !self.inner.start_delay.is_zero() {
            tokio::time::sleep(self.inner.start_delay).await;
        }
        if self.inner.fail_programs.contains(&args.cmd) {
            anyhow::bail!("No such file or directory (os error 2)");
        }
        self.inner.started.lock().unwrap().push(args.clone());

        let (session, probe) = FakeSession::new(self.inner.behavior);
        self.inner.probes.lock().unwrap().push(probe.clone());

        let script = if self.inner.exit_programs.contains(&args.cmd) {
            FakeScript::ExitImmediately(1)
        } else {
            self.inner.script.clone()
        };
        match script {
            FakeScript::Idle => {}
            FakeScript::ExitImmediately(code) => probe.exit(code).await,
            FakeScript::Lines { lines, exit_code } => {
                tokio::spawn(async move {
                    for (stream, line) in lines {
                        probe.write(stream, format!("{line}\n").as_bytes()).await;
                    }
                    probe.exit(exit_code).await;
                });
            }
        }
        Ok(Box::new(session))
    }
}
