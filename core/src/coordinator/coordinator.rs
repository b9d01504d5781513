use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::broadcast::{EventSubscription, OutputBroadcaster, Publisher};
use crate::config::{AppConfig, LimitsConfig};
use crate::context::Services;
use crate::display::{DisplayAvailability, VirtualDisplayManager};
use crate::error::{CoordinatorError, RunnerError};
use crate::platform::PlatformResolver;
use crate::runner::{
    ExecutionEvent, ExecutionHandle, ExecutionStatus, ProcessSupervisor, RunnerPlugin,
    SupervisorOptions, TerminalReport, SENTINEL_EXIT_CODE,
};
use crate::sink::{ExecutionLogSink, StartRecord};

use super::registry::{ExecutionRegistry, ExecutionSummary};
use super::request::ExecutionRequest;

/// Accepts execution requests and drives each one to exactly one terminal report.
///
/// Clones share all state.
#[derive(Clone)]
pub struct ExecutionCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    resolver: PlatformResolver,
    display: Arc<VirtualDisplayManager>,
    runner: Arc<dyn RunnerPlugin>,
    broadcaster: Arc<OutputBroadcaster>,
    sink: Arc<dyn ExecutionLogSink>,
    registry: ExecutionRegistry,
    limits: LimitsConfig,
    options: SupervisorOptions,
    accepting: AtomicBool,
}

impl ExecutionCoordinator {
    pub fn new(cfg: &AppConfig, services: Services) -> Result<Self, RunnerError> {
        let display = Arc::new(VirtualDisplayManager::new(
            cfg.display.clone(),
            services.runner.clone(),
            services.probe.clone(),
        ));
        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                resolver: PlatformResolver::new(
                    &cfg.validation,
                    &cfg.platform,
                    services.probe.clone(),
                ),
                display,
                runner: services.runner,
                broadcaster: Arc::new(OutputBroadcaster::new(cfg.broadcast.channel_capacity)),
                sink: services.log_sink,
                registry: ExecutionRegistry::new(cfg.control.retain_finished),
                limits: cfg.limits.clone(),
                options: SupervisorOptions::from_control(&cfg.control)?,
                accepting: AtomicBool::new(true),
            }),
        })
    }

    pub fn display(&self) -> Arc<VirtualDisplayManager> {
        self.inner.display.clone()
    }

    pub fn broadcaster(&self) -> Arc<OutputBroadcaster> {
        self.inner.broadcaster.clone()
    }

    /// Registers the execution and starts it in the background.
    ///
    /// Returns immediately; must be called from within a tokio runtime.
    pub fn submit(&self, request: ExecutionRequest) -> Result<String, CoordinatorError> {
        self.start(request).map(|handle| handle.id().to_string())
    }

    pub fn status(&self, execution_id: &str) -> Option<ExecutionStatus> {
        self.inner.registry.get(execution_id).map(|h| h.status())
    }

    /// Live events from now on. Unknown ids yield `None`.
    pub fn subscribe(&self, execution_id: &str) -> Option<EventSubscription> {
        let handle = self.inner.registry.get(execution_id)?;
        let rx = self.inner.broadcaster.subscribe(execution_id);
        Some(EventSubscription::new(handle, rx))
    }

    /// Requests termination. Returns false when the execution is unknown or already finished.
    pub fn kill(&self, execution_id: &str, reason: &str) -> bool {
        let Some(handle) = self.inner.registry.get(execution_id) else {
            return false;
        };
        if handle.status().is_terminal() {
            return false;
        }
        let Some(tx) = self.inner.registry.abort_sender(execution_id) else {
            return false;
        };
        match tx.try_send(reason.to_string()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::info!(execution_id, reason, "kill requested");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn outcome(&self, execution_id: &str) -> Option<TerminalReport> {
        self.inner
            .registry
            .get(execution_id)
            .and_then(|h| h.terminal().cloned())
    }

    pub async fn wait(&self, execution_id: &str) -> Option<TerminalReport> {
        let handle = self.inner.registry.get(execution_id)?;
        handle.wait_terminal().await
    }

    /// Submits and waits for the terminal report.
    pub async fn run_to_completion(
        &self,
        request: ExecutionRequest,
    ) -> Result<TerminalReport, CoordinatorError> {
        let handle = self.start(request)?;
        let report = handle.wait_terminal().await;
        Ok(report.unwrap_or_else(|| {
            TerminalReport::rejected(
                handle.id(),
                ExecutionStatus::Failed,
                "execution ended without a terminal report".to_string(),
            )
        }))
    }

    pub fn list(&self) -> Vec<ExecutionSummary> {
        self.inner.registry.list()
    }

    /// Refuses new work and kills in-flight executions. Returns once every
    /// execution task has finished, the log sink is flushed and the display is down.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::Release);
        for (id, tx) in self.inner.registry.in_flight() {
            if tx.try_send("coordinator shutting down".to_string()).is_ok() {
                tracing::info!(execution_id = %id, "killing execution for shutdown");
            }
        }
        for task in self.inner.registry.take_tasks() {
            if let Err(e) = task.await {
                tracing::warn!(error.kind = "coordinator.task_join", error.message = %e);
            }
        }
        self.inner.sink.close().await;
        self.inner.display.shutdown().await;
    }

    fn start(&self, request: ExecutionRequest) -> Result<Arc<ExecutionHandle>, CoordinatorError> {
        if !self.inner.accepting.load(Ordering::Acquire) {
            return Err(CoordinatorError::ShuttingDown);
        }
        let id = request
            .execution_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let handle = ExecutionHandle::new(&id, &request.target);
        let (abort_tx, abort_rx) = mpsc::channel(1);
        self.inner.registry.insert(handle.clone(), abort_tx)?;
        let publisher = self.inner.broadcaster.open(&id);

        let task = tokio::spawn(supervise(
            self.inner.clone(),
            handle.clone(),
            publisher,
            request,
            abort_rx,
        ));
        self.inner.registry.attach_task(&id, task);
        Ok(handle)
    }
}

/// Runs the execution in its own task so a panic still ends in a terminal report.
async fn supervise(
    inner: Arc<CoordinatorInner>,
    handle: Arc<ExecutionHandle>,
    publisher: Publisher,
    request: ExecutionRequest,
    abort_rx: mpsc::Receiver<String>,
) {
    let run = tokio::spawn(execute(
        inner.clone(),
        handle.clone(),
        publisher.clone(),
        request,
        abort_rx,
    ));
    if let Err(e) = run.await {
        let message = if e.is_panic() {
            "execution task panicked"
        } else {
            "execution task cancelled"
        };
        tracing::error!(
            execution_id = %handle.id(),
            error.kind = "coordinator.task_failed",
            error.message = %e,
            "{message}"
        );
        let mut report =
            TerminalReport::rejected(handle.id(), ExecutionStatus::Failed, message.to_string());
        if handle.pid().is_some() {
            report.exit_code = Some(SENTINEL_EXIT_CODE);
        }
        inner.finalize(&handle, &publisher, report).await;
    }
}

async fn execute(
    inner: Arc<CoordinatorInner>,
    handle: Arc<ExecutionHandle>,
    publisher: Publisher,
    request: ExecutionRequest,
    abort_rx: mpsc::Receiver<String>,
) {
    let id = handle.id().to_string();
    let argv = request.argv();

    let record = StartRecord {
        execution_id: id.clone(),
        target: request.target.clone(),
        arguments: argv.clone(),
        requester: request.requester.clone(),
        started_at: handle.started_at(),
    };
    if let Err(e) = inner.sink.record_start(&record).await {
        tracing::warn!(execution_id = %id, error.kind = "sink.record_start_failed", error.message = %e);
    }

    let name = request
        .target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| request.target.display().to_string());
    publisher.status(ExecutionStatus::Starting, format!("starting execution of {name}"));
    tracing::info!(execution_id = %id, path = %request.target.display(), args = argv.len(), "execution submitted");

    let report = match inner.resolver.resolve(&request.target) {
        Err(e) => {
            tracing::warn!(
                execution_id = %id,
                status = %e.status(),
                error.kind = "platform.resolve_failed",
                error.message = %e
            );
            TerminalReport::rejected(&id, e.status(), e.to_string())
        }
        Ok(mut spec) => {
            spec.push_args(argv);
            spec.working_dir = request.working_dir.clone();
            let limits = inner
                .limits
                .resolve(request.timeout_secs, request.max_output_bytes);

            let mut supervisor = ProcessSupervisor::new(
                handle.clone(),
                publisher.clone(),
                limits,
                inner.options.clone(),
            );

            // Held until the process is gone.
            let _lease = if spec.needs_display {
                match inner.display.ensure_running().await {
                    DisplayAvailability::Ready { display } => {
                        spec.set_display(&display);
                        inner.display.acquire()
                    }
                    DisplayAvailability::Headless { reason } => {
                        supervisor.notice(format!(
                            "virtual display unavailable ({reason}); running headless"
                        ));
                        None
                    }
                }
            } else {
                None
            };

            supervisor
                .run(inner.runner.as_ref(), spec.to_start_args(), abort_rx)
                .await
        }
    };

    inner.finalize(&handle, &publisher, report).await;
}

impl CoordinatorInner {
    /// Commits the report once; only the winning commit is published and logged.
    async fn finalize(&self, handle: &ExecutionHandle, publisher: &Publisher, report: TerminalReport) {
        let id = handle.id();
        if !handle.commit_terminal(report.clone()) {
            self.broadcaster.close(id);
            return;
        }
        tracing::info!(
            execution_id = %id,
            status = %report.status,
            exit_code = report.exit_code,
            truncated = report.truncated,
            duration_ms = report.duration_ms,
            "execution finished"
        );
        publisher.publish(ExecutionEvent::Terminal(report.clone()));
        self.broadcaster.close(id);
        if let Err(e) = self.sink.record_terminal(&report).await {
            tracing::warn!(execution_id = %id, error.kind = "sink.record_terminal_failed", error.message = %e);
        }
        self.registry.mark_finished(id);
    }
}
