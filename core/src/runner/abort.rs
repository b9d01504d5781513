use std::time::Duration;

use super::traits::RunnerSession;
use super::types::{RunOutcome, Signal};

/// Upper bound for reaping a child after SIGKILL.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct TerminationResult {
    pub outcome: Option<RunOutcome>,
    pub force_killed: bool,
}

/// SIGTERM, wait up to `grace`, SIGKILL if still alive, then reap.
///
/// Signal and wait errors are logged and never short-circuit the sequence.
pub async fn terminate_then_kill(
    session: &mut Box<dyn RunnerSession>,
    execution_id: &str,
    grace: Duration,
    reason: &str,
) -> TerminationResult {
    tracing::info!(execution_id, reason, grace_ms = grace.as_millis() as u64, "terminating child");

    if let Err(e) = session.signal(Signal::Term).await {
        tracing::warn!(execution_id, error.kind = "terminate.term_failed", error.message = %e);
    }

    match tokio::time::timeout(grace, session.wait()).await {
        Ok(Ok(outcome)) => {
            return TerminationResult {
                outcome: Some(outcome),
                force_killed: false,
            };
        }
        Ok(Err(e)) => {
            tracing::warn!(execution_id, error.kind = "terminate.wait_failed", error.message = %e);
        }
        Err(_) => {
            tracing::warn!(execution_id, "child ignored SIGTERM within grace period");
        }
    }

    if let Err(e) = session.signal(Signal::Kill).await {
        tracing::error!(execution_id, error.kind = "terminate.kill_failed", error.message = %e);
    }

    let outcome = match tokio::time::timeout(KILL_REAP_TIMEOUT, session.wait()).await {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(e)) => {
            tracing::error!(execution_id, error.kind = "terminate.reap_failed", error.message = %e);
            None
        }
        Err(_) => {
            tracing::error!(execution_id, error.kind = "terminate.reap_timeout");
            None
        }
    };

    TerminationResult {
        outcome,
        force_killed: true,
    }
}
