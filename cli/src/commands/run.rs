use std::sync::Arc;

use binrelay_core::api::{
    AppConfig, AppContext, CliError, ExecutionCoordinator, ExecutionEvent, ExecutionRequest,
    ExecutionStatus, Requester, TerminalReport,
};
use binrelay_plugins::PluginServicesFactory;

use super::cli::RunArgs;

#[tracing::instrument(name = "cli.run", skip_all, fields(path = %args.target.display()))]
pub async fn run(args: RunArgs, cfg: AppConfig) -> Result<i32, CliError> {
    let ctx = AppContext::new(cfg, Some(Arc::new(PluginServicesFactory)));
    let coordinator = ctx.build_coordinator().await?;

    // `main` exits the process without running destructors, so the display
    // stages and the history writer are torn down here on every path.
    let result = follow(&coordinator, &args).await;
    coordinator.shutdown().await;
    let report = result?;
    Ok(exit_code_for_report(&report))
}

async fn follow(
    coordinator: &ExecutionCoordinator,
    args: &RunArgs,
) -> Result<TerminalReport, CliError> {
    let id = coordinator.submit(build_request(args))?;
    let mut sub = coordinator
        .subscribe(&id)
        .ok_or_else(|| CliError::Command(format!("execution {id} vanished")))?;

    let mut interrupted = false;
    let mut report = None;
    loop {
        tokio::select! {
            ev = sub.recv() => {
                let Some(ev) = ev else { break };
                print_event(&ev, args.json)?;
                if let ExecutionEvent::Terminal(r) = ev {
                    report = Some(r);
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("interrupted, stopping {id}");
                coordinator.kill(&id, "interrupted by user");
            }
        }
    }

    report
        .or_else(|| coordinator.outcome(&id))
        .ok_or_else(|| CliError::Command(format!("execution {id} has no outcome")))
}

fn build_request(args: &RunArgs) -> ExecutionRequest {
    let mut req = ExecutionRequest::new(&args.target);
    if !args.argv.is_empty() {
        let mut argv: Vec<String> = args
            .args_line
            .as_deref()
            .map(|l| l.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        argv.extend(args.argv.iter().cloned());
        req = req.with_args(argv);
    } else if let Some(line) = &args.args_line {
        req = req.with_args_line(line.clone());
    }
    if let Some(id) = &args.id {
        req = req.with_id(id.clone());
    }
    if let Some(secs) = args.timeout {
        req = req.with_timeout_secs(secs);
    }
    if let Some(bytes) = args.max_output {
        req = req.with_max_output_bytes(bytes);
    }
    if let Some(dir) = &args.cwd {
        req = req.with_working_dir(dir.clone());
    }
    if args.user.is_some() {
        req = req.with_requester(Requester {
            user: args.user.clone(),
            remote_addr: None,
        });
    }
    req
}

fn print_event(ev: &ExecutionEvent, json: bool) -> Result<(), CliError> {
    if json {
        let line = serde_json::to_string(ev).map_err(|e| CliError::Command(e.to_string()))?;
        println!("{line}");
        return Ok(());
    }
    match ev {
        ExecutionEvent::Output(o) => println!("{}", o.render()),
        ExecutionEvent::Status { status, message, .. } => eprintln!("[{status}] {message}"),
        ExecutionEvent::Terminal(r) => {
            let code = r
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string());
            eprintln!(
                "[{}] {} (exit={code}, {} bytes{}, {}ms)",
                r.status,
                r.message,
                r.output_bytes,
                if r.truncated { ", truncated" } else { "" },
                r.duration_ms
            );
        }
    }
    Ok(())
}

/// Child exit code when it completed; fixed codes for the other outcomes.
pub fn exit_code_for_report(report: &TerminalReport) -> i32 {
    match report.status {
        ExecutionStatus::Completed => report.exit_code.unwrap_or(0),
        ExecutionStatus::TimedOut => 124,
        ExecutionStatus::Failed => 125,
        ExecutionStatus::CapabilityUnavailable => 126,
        ExecutionStatus::RejectedInvalid => 127,
        ExecutionStatus::Starting | ExecutionStatus::Running => 50,
    }
}
