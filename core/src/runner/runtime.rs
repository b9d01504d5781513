//! Supervisor loop for one child process: output pumping, limits, termination.
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;

use crate::broadcast::Publisher;
use crate::config::ControlConfig;
use crate::error::RunnerError;

use super::abort;
use super::events::ExecutionEvent;
use super::handle::ExecutionHandle;
use super::io_pump::{self, LineDecoder, LineTap, PumpEvent};
use super::output::OutputLog;
use super::traits::RunnerPlugin;
use super::types::{
    ExecutionLimits, ExecutionStatus, RunOutcome, RunnerStartArgs, TerminalReport,
    SENTINEL_EXIT_CODE,
};

/// Deadlines further out than this are clamped.
const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub terminate_grace: Duration,
    pub drain_timeout: Duration,
    pub line_channel_capacity: usize,
    pub max_line_bytes: usize,
    pub decoder: LineDecoder,
}

impl SupervisorOptions {
    pub fn from_control(cfg: &ControlConfig) -> Result<Self, RunnerError> {
        Ok(Self {
            terminate_grace: Duration::from_millis(cfg.terminate_grace_ms),
            drain_timeout: Duration::from_millis(cfg.drain_timeout_ms),
            line_channel_capacity: cfg.line_channel_capacity.max(1),
            max_line_bytes: io_pump::DEFAULT_MAX_LINE_BYTES,
            decoder: LineDecoder::for_label(&cfg.output_encoding)?,
        })
    }
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        let cfg = ControlConfig::default();
        Self {
            terminate_grace: Duration::from_millis(cfg.terminate_grace_ms),
            drain_timeout: Duration::from_millis(cfg.drain_timeout_ms),
            line_channel_capacity: cfg.line_channel_capacity,
            max_line_bytes: io_pump::DEFAULT_MAX_LINE_BYTES,
            decoder: LineDecoder::utf8(),
        }
    }
}

#[derive(Debug)]
enum StopReason {
    Timeout,
    Killed(String),
    OutputCap,
    StreamError(String),
}

impl StopReason {
    fn describe(&self) -> String {
        match self {
            StopReason::Timeout => "timeout".to_string(),
            StopReason::Killed(reason) => format!("kill requested: {reason}"),
            StopReason::OutputCap => "output limit exceeded".to_string(),
            StopReason::StreamError(e) => format!("stream error: {e}"),
        }
    }
}

/// Owns the lifecycle of one execution from spawn to terminal report.
///
/// The report is returned, not committed; the caller decides whether it wins.
pub struct ProcessSupervisor {
    handle: Arc<ExecutionHandle>,
    publisher: Publisher,
    limits: ExecutionLimits,
    options: SupervisorOptions,
    log: OutputLog,
}

impl ProcessSupervisor {
    pub fn new(
        handle: Arc<ExecutionHandle>,
        publisher: Publisher,
        limits: ExecutionLimits,
        options: SupervisorOptions,
    ) -> Self {
        let log = OutputLog::new(handle.id());
        Self {
            handle,
            publisher,
            limits,
            options,
            log,
        }
    }

    /// Publishes an informational SYSTEM line ahead of the child's output.
    pub fn notice(&mut self, text: impl Into<String>) {
        let event = self.log.notice(text);
        self.publisher.publish(ExecutionEvent::Output(event));
    }

    pub async fn run(
        mut self,
        runner: &dyn RunnerPlugin,
        args: RunnerStartArgs,
        mut abort_rx: mpsc::Receiver<String>,
    ) -> TerminalReport {
        let started = Instant::now();
        let id = self.handle.id().to_string();

        if let Ok(reason) = abort_rx.try_recv() {
            return self.finish(
                started,
                ExecutionStatus::Failed,
                None,
                format!("killed before start: {reason}"),
            );
        }

        let mut session = match runner.start_session(&args).await {
            Ok(session) => session,
            Err(e) => {
                let err = RunnerError::Spawn(e.to_string());
                tracing::error!(
                    execution_id = %id,
                    program = %args.cmd,
                    error.kind = "runner.spawn_failed",
                    error.message = %err
                );
                return self.finish(started, ExecutionStatus::Failed, None, err.to_string());
            }
        };

        let pid = session.pid();
        self.handle.mark_running(pid);
        let message = match pid {
            Some(pid) => format!("process started (pid {pid})"),
            None => "process started".to_string(),
        };
        self.publisher.status(ExecutionStatus::Running, message);
        tracing::info!(execution_id = %id, pid, program = %args.cmd, runner = runner.name(), "process started");

        let (line_tx, mut line_rx) = mpsc::channel::<PumpEvent>(self.options.line_channel_capacity);
        let max_line = self.max_line();
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = session.stdout() {
            pumps.push(io_pump::pump_stdout(
                stdout,
                self.options.decoder,
                max_line,
                line_tx.clone(),
            ));
        }
        if let Some(stderr) = session.stderr() {
            pumps.push(io_pump::pump_stderr(
                stderr,
                self.options.decoder,
                max_line,
                line_tx.clone(),
            ));
        }
        drop(line_tx);

        let deadline = tokio::time::Instant::now() + self.limits.timeout.min(MAX_TIMEOUT);

        let (exit, stop): (Option<anyhow::Result<RunOutcome>>, Option<StopReason>) = {
            let wait_fut = session.wait();
            tokio::pin!(wait_fut);
            let sleep = tokio::time::sleep_until(deadline);
            tokio::pin!(sleep);

            let mut pumps_open = true;
            let mut abort_open = true;

            loop {
                tokio::select! {
                    res = &mut wait_fut => break (Some(res), None),

                    _ = &mut sleep => {
                        tracing::warn!(
                            execution_id = %id,
                            timeout_secs = self.limits.timeout.as_secs(),
                            "execution timed out"
                        );
                        break (None, Some(StopReason::Timeout));
                    }

                    msg = abort_rx.recv(), if abort_open => match msg {
                        Some(reason) => {
                            tracing::warn!(execution_id = %id, error.kind = "user.abort", reason = %reason);
                            break (None, Some(StopReason::Killed(reason)));
                        }
                        None => abort_open = false,
                    },

                    ev = line_rx.recv(), if pumps_open => match ev {
                        Some(ev) => {
                            if let Some(stop) = self.on_pump_event(ev) {
                                break (None, Some(stop));
                            }
                        }
                        None => pumps_open = false,
                    },
                }
            }
        };

        let (status, exit_code, message) = match stop {
            None => {
                self.drain(&mut line_rx).await;
                match exit {
                    Some(Ok(outcome)) => (
                        ExecutionStatus::Completed,
                        Some(outcome.exit_code),
                        format!("process exited with code {}", outcome.exit_code),
                    ),
                    Some(Err(e)) => {
                        tracing::error!(execution_id = %id, error.kind = "runner.wait_failed", error.message = %e);
                        (
                            ExecutionStatus::Failed,
                            Some(SENTINEL_EXIT_CODE),
                            format!("failed to wait for process: {e}"),
                        )
                    }
                    None => (
                        ExecutionStatus::Failed,
                        Some(SENTINEL_EXIT_CODE),
                        "process exit was not observed".to_string(),
                    ),
                }
            }
            Some(reason) => {
                let term = abort::terminate_then_kill(
                    &mut session,
                    &id,
                    self.options.terminate_grace,
                    &reason.describe(),
                )
                .await;
                self.drain(&mut line_rx).await;

                match reason {
                    StopReason::Timeout => (
                        ExecutionStatus::TimedOut,
                        Some(SENTINEL_EXIT_CODE),
                        format!(
                            "execution exceeded timeout of {}s and was terminated",
                            self.limits.timeout.as_secs()
                        ),
                    ),
                    StopReason::Killed(reason) => (
                        ExecutionStatus::Failed,
                        Some(SENTINEL_EXIT_CODE),
                        format!("killed: {reason}"),
                    ),
                    StopReason::StreamError(e) => (
                        ExecutionStatus::Failed,
                        Some(SENTINEL_EXIT_CODE),
                        format!("output stream failed: {e}"),
                    ),
                    StopReason::OutputCap => {
                        let code = term
                            .outcome
                            .map(|o| o.exit_code)
                            .unwrap_or(SENTINEL_EXIT_CODE);
                        (
                            ExecutionStatus::Completed,
                            Some(code),
                            format!(
                                "output exceeded {} bytes; process terminated (exit code {code})",
                                self.limits.max_output_bytes
                            ),
                        )
                    }
                }
            }
        };

        for pump in pumps {
            pump.abort();
        }

        self.finish(started, status, exit_code, message)
    }

    /// Keeps reading lines after the child is gone, bounded by the drain timeout.
    async fn drain(&mut self, line_rx: &mut mpsc::Receiver<PumpEvent>) {
        let limit = self.options.drain_timeout;
        let drained = tokio::time::timeout(limit, async {
            while let Some(ev) = line_rx.recv().await {
                // The process is already gone; a late breach only truncates.
                let _ = self.on_pump_event(ev);
            }
        })
        .await;
        if drained.is_err() {
            tracing::debug!(
                execution_id = %self.handle.id(),
                drain_ms = limit.as_millis() as u64,
                "output pipes still open after exit, stopping readers"
            );
        }
    }

    fn on_pump_event(&mut self, ev: PumpEvent) -> Option<StopReason> {
        match ev {
            PumpEvent::Line(tap) => self.on_line(tap),
            PumpEvent::Failed { stream, error } => {
                tracing::error!(
                    execution_id = %self.handle.id(),
                    stream = stream.label(),
                    error.kind = "stream.io_failed",
                    error.message = %error
                );
                Some(StopReason::StreamError(error.to_string()))
            }
        }
    }

    /// A single unterminated line can never exceed the cap by more than one byte.
    fn max_line(&self) -> usize {
        let cap = usize::try_from(self.limits.max_output_bytes.saturating_add(1))
            .unwrap_or(usize::MAX);
        self.options.max_line_bytes.min(cap).max(1)
    }

    fn on_line(&mut self, tap: LineTap) -> Option<StopReason> {
        if self.log.is_truncated() {
            return None;
        }
        self.handle.record_line(tap.bytes);
        let event = self.log.push(tap.stream, tap.line, tap.bytes);
        self.publisher.publish(ExecutionEvent::Output(event));

        if self.log.bytes() > self.limits.max_output_bytes {
            let notice = self.log.truncate(self.limits.max_output_bytes);
            self.publisher.publish(ExecutionEvent::Output(notice));
            tracing::warn!(
                execution_id = %self.handle.id(),
                bytes = self.log.bytes(),
                limit = self.limits.max_output_bytes,
                "output limit exceeded"
            );
            return Some(StopReason::OutputCap);
        }
        None
    }

    fn finish(
        &self,
        started: Instant,
        status: ExecutionStatus,
        exit_code: Option<i32>,
        message: String,
    ) -> TerminalReport {
        TerminalReport {
            execution_id: self.handle.id().to_string(),
            status,
            success: status == ExecutionStatus::Completed && exit_code == Some(0),
            exit_code,
            message,
            output: self.log.snapshot(),
            truncated: self.log.is_truncated(),
            output_bytes: self.log.bytes(),
            duration_ms: started.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast;

    use super::*;
    use crate::runner::events::LineStream;
    use crate::runner::testing::{FakeBehavior, FakeProbe, FakeRunner, FakeScript};
    use crate::runner::types::Signal;

    struct Fixture {
        supervisor: ProcessSupervisor,
        handle: Arc<ExecutionHandle>,
        events: broadcast::Receiver<ExecutionEvent>,
    }

    fn fixture(limits: ExecutionLimits) -> Fixture {
        let handle = ExecutionHandle::new("exec-1", "app.exe");
        let publisher = Publisher::detached("exec-1", 256);
        let events = publisher.subscribe();
        let options = SupervisorOptions {
            terminate_grace: Duration::from_millis(50),
            drain_timeout: Duration::from_millis(100),
            ..SupervisorOptions::default()
        };
        Fixture {
            supervisor: ProcessSupervisor::new(handle.clone(), publisher, limits, options),
            handle,
            events,
        }
    }

    fn limits(timeout_ms: u64, max_output_bytes: u64) -> ExecutionLimits {
        ExecutionLimits {
            timeout: Duration::from_millis(timeout_ms),
            max_output_bytes,
        }
    }

    fn args(cmd: &str) -> RunnerStartArgs {
        RunnerStartArgs {
            cmd: cmd.to_string(),
            ..RunnerStartArgs::default()
        }
    }

    fn drain_events(rx: &mut broadcast::Receiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn output_lines(events: &[ExecutionEvent]) -> Vec<(u64, LineStream, String)> {
        events
            .iter()
            .filter_map(|ev| match ev {
                ExecutionEvent::Output(o) => Some((o.seq, o.stream, o.line.clone())),
                _ => None,
            })
            .collect()
    }

    async fn first_probe(runner: &FakeRunner) -> FakeProbe {
        for _ in 0..400 {
            if let Some(probe) = runner.probes().into_iter().next() {
                return probe;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("runner never started a session");
    }

    #[tokio::test]
    async fn completes_with_all_lines_in_order() {
        let lines: Vec<(LineStream, String)> = (1..=10)
            .map(|i| (LineStream::Stdout, format!("line {i}")))
            .collect();
        let runner = FakeRunner::new(
            FakeBehavior::ExitOnTerm(143),
            FakeScript::Lines {
                lines,
                exit_code: 0,
            },
        );
        let (_abort_tx, abort_rx) = mpsc::channel(1);
        let mut fx = fixture(limits(5_000, 1024 * 1024));

        let report = fx.supervisor.run(&runner, args("app"), abort_rx).await;

        assert_eq!(report.status, ExecutionStatus::Completed);
        assert_eq!(report.exit_code, Some(0));
        assert!(report.success);
        assert!(!report.truncated);
        let expected: Vec<String> = (1..=10).map(|i| format!("line {i}")).collect();
        assert_eq!(report.output, expected.join("\n"));

        let events = drain_events(&mut fx.events);
        assert!(matches!(
            events.first(),
            Some(ExecutionEvent::Status {
                status: ExecutionStatus::Running,
                ..
            })
        ));
        let seqs: Vec<u64> = output_lines(&events).iter().map(|(s, _, _)| *s).collect();
        assert_eq!(seqs, (1..=10).collect::<Vec<u64>>());

        assert_eq!(fx.handle.status(), ExecutionStatus::Running);
        assert_eq!(fx.handle.pid(), Some(4242));
        assert_eq!(fx.handle.lines_emitted(), 10);
    }

    #[tokio::test]
    async fn timeout_terminates_gracefully_then_kills() {
        let runner = FakeRunner::new(FakeBehavior::IgnoreTerm, FakeScript::Idle);
        let (_abort_tx, abort_rx) = mpsc::channel(1);
        let fx = fixture(limits(100, 1024));

        let started = Instant::now();
        let report = fx.supervisor.run(&runner, args("app"), abort_rx).await;

        assert_eq!(report.status, ExecutionStatus::TimedOut);
        assert_eq!(report.exit_code, Some(-1));
        assert!(!report.success);
        assert!(started.elapsed() >= Duration::from_millis(100));
        let probe = runner.probes().remove(0);
        assert_eq!(probe.signals(), vec![Signal::Term, Signal::Kill]);
        assert!(probe.has_exited());
    }

    #[tokio::test]
    async fn output_cap_truncates_and_still_completes() {
        let runner = FakeRunner::new(FakeBehavior::ExitOnTerm(143), FakeScript::Idle);
        let (_abort_tx, abort_rx) = mpsc::channel(1);
        let Fixture {
            supervisor,
            mut events,
            ..
        } = fixture(limits(5_000, 16));

        let task = {
            let runner = runner.clone();
            tokio::spawn(async move { supervisor.run(&runner, args("app"), abort_rx).await })
        };
        let probe = first_probe(&runner).await;
        probe.write(LineStream::Stdout, b"0123456789\n").await;
        probe.write(LineStream::Stderr, b"0123456789\n").await;

        let report = task.await.unwrap();

        assert_eq!(report.status, ExecutionStatus::Completed);
        assert!(report.truncated);
        assert_eq!(report.exit_code, Some(143));
        assert_eq!(report.output_bytes, 22);
        assert_eq!(probe.signals(), vec![Signal::Term]);

        let lines = output_lines(&drain_events(&mut events));
        assert_eq!(lines.len(), 3);
        let (_, stream, text) = lines.last().unwrap();
        assert_eq!(*stream, LineStream::System);
        assert!(text.contains("truncated"));
        assert!(report.output.ends_with(text.as_str()));
    }

    #[tokio::test]
    async fn output_without_newlines_still_hits_the_cap() {
        let runner = FakeRunner::new(FakeBehavior::ExitOnTerm(143), FakeScript::Idle);
        let (_abort_tx, abort_rx) = mpsc::channel(1);
        let fx = fixture(limits(5_000, 1024));

        let task = {
            let runner = runner.clone();
            tokio::spawn(async move { fx.supervisor.run(&runner, args("app"), abort_rx).await })
        };
        let probe = first_probe(&runner).await;
        probe.write(LineStream::Stdout, &[b'x'; 16 * 1024]).await;

        let report = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("cap never fired")
            .unwrap();

        assert_eq!(report.status, ExecutionStatus::Completed);
        assert!(report.truncated);
        assert_eq!(report.output_bytes, 1025);
        assert_eq!(probe.signals(), vec![Signal::Term]);
    }

    #[tokio::test]
    async fn external_kill_fails_with_sentinel_exit_code() {
        let runner = FakeRunner::new(FakeBehavior::ExitOnTerm(143), FakeScript::Idle);
        let (abort_tx, abort_rx) = mpsc::channel(1);
        let fx = fixture(limits(5_000, 1024));

        let task = {
            let runner = runner.clone();
            tokio::spawn(async move { fx.supervisor.run(&runner, args("app"), abort_rx).await })
        };
        first_probe(&runner).await;
        abort_tx.send("operator request".to_string()).await.unwrap();

        let report = task.await.unwrap();
        assert_eq!(report.status, ExecutionStatus::Failed);
        assert_eq!(report.exit_code, Some(-1));
        assert!(report.message.contains("operator request"));
    }

    #[tokio::test]
    async fn kill_before_spawn_never_starts_the_process() {
        let runner = FakeRunner::new(FakeBehavior::ExitOnTerm(143), FakeScript::Idle);
        let (abort_tx, abort_rx) = mpsc::channel(1);
        abort_tx.send("shutdown".to_string()).await.unwrap();
        let fx = fixture(limits(5_000, 1024));

        let report = fx.supervisor.run(&runner, args("app"), abort_rx).await;

        assert_eq!(report.status, ExecutionStatus::Failed);
        assert!(runner.started().is_empty());
    }

    #[tokio::test]
    async fn spawn_failure_reports_failed_without_exit_code() {
        let runner = FakeRunner::build(
            FakeBehavior::ExitOnTerm(143),
            FakeScript::Idle,
            Duration::ZERO,
            vec!["missing".to_string()],
            vec![],
        );
        let (_abort_tx, abort_rx) = mpsc::channel(1);
        let fx = fixture(limits(5_000, 1024));

        let report = fx.supervisor.run(&runner, args("missing"), abort_rx).await;

        assert_eq!(report.status, ExecutionStatus::Failed);
        assert_eq!(report.exit_code, None);
        assert!(report.message.contains("spawn failed"));
        assert_eq!(fx.handle.status(), ExecutionStatus::Starting);
    }

    #[tokio::test]
    async fn drain_is_bounded_when_pipes_stay_open() {
        let runner = FakeRunner::new(FakeBehavior::ExitOnTerm(143), FakeScript::Idle);
        let (_abort_tx, abort_rx) = mpsc::channel(1);
        let fx = fixture(limits(5_000, 1024));

        let task = {
            let runner = runner.clone();
            tokio::spawn(async move { fx.supervisor.run(&runner, args("app"), abort_rx).await })
        };
        let probe = first_probe(&runner).await;
        probe.write(LineStream::Stdout, b"late\n").await;
        probe.exit_keep_streams(0);

        let report = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("drain should be bounded")
            .unwrap();
        assert_eq!(report.status, ExecutionStatus::Completed);
        assert_eq!(report.exit_code, Some(0));
        assert_eq!(report.output, "late");
    }

    #[tokio::test]
    async fn notices_precede_child_output() {
        let runner = FakeRunner::new(
            FakeBehavior::ExitOnTerm(143),
            FakeScript::Lines {
                lines: vec![(LineStream::Stdout, "hello".to_string())],
                exit_code: 3,
            },
        );
        let (_abort_tx, abort_rx) = mpsc::channel(1);
        let mut fx = fixture(limits(5_000, 1024));

        fx.supervisor.notice("virtual display unavailable; running headless");
        let report = fx.supervisor.run(&runner, args("app"), abort_rx).await;

        assert_eq!(report.exit_code, Some(3));
        assert!(!report.success);
        assert_eq!(
            report.output,
            "virtual display unavailable; running headless\nhello"
        );
        let lines = output_lines(&drain_events(&mut fx.events));
        assert_eq!(lines[0].1, LineStream::System);
        assert_eq!(lines[1], (2, LineStream::Stdout, "hello".to_string()));
    }
}
