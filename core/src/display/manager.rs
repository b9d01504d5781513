use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::DisplayConfig;
use crate::error::DisplayError;
use crate::platform::CapabilityProbe;
use crate::runner::{terminate_then_kill, RunnerPlugin, RunnerSession};

use super::lease::DisplayLease;
use super::stages::{self, StageKind, StagePlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Stopped,
    Starting,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayAvailability {
    Ready { display: String },
    Headless { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DisplayStatus {
    pub state: DisplayState,
    pub display: String,
    pub stages: Vec<(String, Option<u32>)>,
    pub active_leases: usize,
}

struct RunningStage {
    kind: StageKind,
    session: Box<dyn RunnerSession>,
    sinks: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    stages: Vec<RunningStage>,
    attempt: u64,
    last_outcome: Option<DisplayAvailability>,
}

/// Owns the one shared virtual display.
///
/// Startup runs under a mutex. Callers that queued behind an attempt which
/// has since finished take that attempt's outcome instead of retrying.
pub struct VirtualDisplayManager {
    cfg: DisplayConfig,
    runner: Arc<dyn RunnerPlugin>,
    probe: Arc<dyn CapabilityProbe>,
    state_tx: watch::Sender<DisplayState>,
    inner: Mutex<Inner>,
    attempts: AtomicU64,
    leases: Arc<AtomicUsize>,
}

impl VirtualDisplayManager {
    pub fn new(
        cfg: DisplayConfig,
        runner: Arc<dyn RunnerPlugin>,
        probe: Arc<dyn CapabilityProbe>,
    ) -> Self {
        let (state_tx, _) = watch::channel(DisplayState::Stopped);
        Self {
            cfg,
            runner,
            probe,
            state_tx,
            inner: Mutex::new(Inner::default()),
            attempts: AtomicU64::new(0),
            leases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn display_name(&self) -> String {
        self.cfg.display_name()
    }

    /// Stages that would start on this host, or `None` without a display server.
    pub fn planned_stages(&self) -> Option<Vec<StagePlan>> {
        stages::plan(&self.cfg, self.probe.as_ref())
    }

    pub fn state(&self) -> DisplayState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<DisplayState> {
        self.state_tx.subscribe()
    }

    pub async fn ensure_running(&self) -> DisplayAvailability {
        if !self.cfg.enabled {
            return DisplayAvailability::Headless {
                reason: DisplayError::Disabled.to_string(),
            };
        }
        let observed = self.attempts.load(Ordering::Acquire);
        let mut inner = self.inner.lock().await;

        if self.state() == DisplayState::Running {
            if self.stages_alive(&mut inner) {
                return self.ready();
            }
            self.stop_stages(&mut inner).await;
            inner.last_outcome = None;
            self.state_tx.send_replace(DisplayState::Stopped);
        }
        if inner.attempt != observed {
            if let Some(outcome) = inner.last_outcome.clone() {
                return outcome;
            }
        }

        self.state_tx.send_replace(DisplayState::Starting);
        tracing::info!(display = %self.display_name(), "starting virtual display");

        let outcome = match self.start_stages(&mut inner).await {
            Ok(()) => {
                self.state_tx.send_replace(DisplayState::Running);
                tracing::info!(display = %self.display_name(), stages = inner.stages.len(), "virtual display ready");
                self.ready()
            }
            Err(e) => {
                tracing::warn!(error.kind = "display.start_failed", error.message = %e);
                self.stop_stages(&mut inner).await;
                self.state_tx.send_replace(DisplayState::Stopped);
                DisplayAvailability::Headless {
                    reason: e.to_string(),
                }
            }
        };

        inner.attempt += 1;
        inner.last_outcome = Some(outcome.clone());
        self.attempts.store(inner.attempt, Ordering::Release);
        outcome
    }

    /// A lease on the running display, or `None` when it is not running.
    pub fn acquire(&self) -> Option<DisplayLease> {
        (self.state() == DisplayState::Running)
            .then(|| DisplayLease::new(self.display_name(), self.leases.clone()))
    }

    pub fn active_leases(&self) -> usize {
        self.leases.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> DisplayStatus {
        let inner = self.inner.lock().await;
        DisplayStatus {
            state: self.state(),
            display: self.display_name(),
            stages: inner
                .stages
                .iter()
                .map(|s| (s.kind.label().to_string(), s.session.pid()))
                .collect(),
            active_leases: self.active_leases(),
        }
    }

    /// Stops every stage, newest first. No-op when nothing is running.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if inner.stages.is_empty() {
            self.state_tx.send_replace(DisplayState::Stopped);
            return;
        }
        let leases = self.active_leases();
        if leases > 0 {
            tracing::warn!(leases, "stopping virtual display while executions still use it");
        }
        self.stop_stages(&mut inner).await;
        inner.last_outcome = None;
        self.state_tx.send_replace(DisplayState::Stopped);
        tracing::info!(display = %self.display_name(), "virtual display stopped");
    }

    /// False when any stage has exited since startup.
    fn stages_alive(&self, inner: &mut Inner) -> bool {
        for stage in inner.stages.iter_mut() {
            match stage.session.try_wait() {
                Ok(None) => {}
                Ok(Some(outcome)) => {
                    tracing::warn!(
                        stage = stage.kind.label(),
                        exit_code = outcome.exit_code,
                        error.kind = "display.stage_died",
                        "display stage exited, restarting the display"
                    );
                    return false;
                }
                Err(e) => {
                    tracing::warn!(stage = stage.kind.label(), error.kind = "display.stage_unknown", error.message = %e);
                    return false;
                }
            }
        }
        true
    }

    fn ready(&self) -> DisplayAvailability {
        DisplayAvailability::Ready {
            display: self.display_name(),
        }
    }

    async fn start_stages(&self, inner: &mut Inner) -> Result<(), DisplayError> {
        let plan = self
            .planned_stages()
            .ok_or_else(|| DisplayError::ServerUnavailable(self.cfg.server_bin.clone()))?;
        for stage in plan {
            let running = self.start_stage(&stage).await?;
            inner.stages.push(running);
        }
        Ok(())
    }

    async fn start_stage(&self, plan: &StagePlan) -> Result<RunningStage, DisplayError> {
        let stage = plan.kind.label();
        let mut session = self
            .runner
            .start_session(&plan.to_start_args())
            .await
            .map_err(|source| DisplayError::StageSpawn { stage, source })?;

        // Nobody reads stage output; keep the pipes from filling up.
        let mut sinks = Vec::with_capacity(2);
        for mut rd in [session.stdout(), session.stderr()].into_iter().flatten() {
            sinks.push(tokio::spawn(async move {
                let _ = tokio::io::copy(&mut rd, &mut tokio::io::sink()).await;
            }));
        }

        let settle = Duration::from_millis(self.cfg.settle_ms);
        match tokio::time::timeout(settle, session.wait()).await {
            Err(_) => {}
            Ok(Ok(outcome)) => {
                sinks.iter().for_each(JoinHandle::abort);
                return Err(DisplayError::StageExited {
                    stage,
                    exit_code: outcome.exit_code,
                });
            }
            Ok(Err(source)) => {
                sinks.iter().for_each(JoinHandle::abort);
                return Err(DisplayError::StageSpawn { stage, source });
            }
        }

        tracing::info!(stage, pid = session.pid(), program = %plan.program.display(), "display stage started");
        Ok(RunningStage {
            kind: plan.kind,
            session,
            sinks,
        })
    }

    async fn stop_stages(&self, inner: &mut Inner) {
        let grace = Duration::from_millis(self.cfg.shutdown_grace_ms);
        while let Some(mut stage) = inner.stages.pop() {
            let label = stage.kind.label();
            let result = terminate_then_kill(&mut stage.session, label, grace, "display shutdown").await;
            tracing::debug!(stage = label, force_killed = result.force_killed, "display stage stopped");
            stage.sinks.iter().for_each(JoinHandle::abort);
        }
    }
}
