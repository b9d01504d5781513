use std::sync::Arc;

use binrelay_core::api::{AppConfig, CliError, DisplayAvailability, VirtualDisplayManager};
use binrelay_plugins::factory;

use super::cli::{DisplayAction, DisplayArgs};

pub async fn display(args: DisplayArgs, cfg: AppConfig) -> Result<i32, CliError> {
    let manager = Arc::new(VirtualDisplayManager::new(
        cfg.display.clone(),
        factory::build_runner(&cfg),
        factory::build_probe(&cfg),
    ));
    match args.action {
        DisplayAction::Status => {
            print_plan(&manager, &cfg);
            Ok(0)
        }
        DisplayAction::Start => start(&manager).await,
    }
}

fn print_plan(manager: &VirtualDisplayManager, cfg: &AppConfig) {
    println!("display: {}", manager.display_name());
    println!("enabled: {}", cfg.display.enabled);
    match manager.planned_stages() {
        None => println!("server:  {} not found, executions run headless", cfg.display.server_bin),
        Some(stages) => {
            for stage in stages {
                println!("{:<15} {} {}", stage.kind.label(), stage.program.display(), stage.args.join(" "));
            }
        }
    }
}

async fn start(manager: &VirtualDisplayManager) -> Result<i32, CliError> {
    match manager.ensure_running().await {
        DisplayAvailability::Headless { reason } => {
            eprintln!("virtual display unavailable: {reason}");
            Ok(1)
        }
        DisplayAvailability::Ready { display } => {
            let status = manager.status().await;
            for (stage, pid) in &status.stages {
                let pid = pid.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
                println!("{stage:<15} pid {pid}");
            }
            println!("DISPLAY={display} is up, Ctrl-C to stop");
            let waited = tokio::signal::ctrl_c().await;
            manager.shutdown().await;
            waited?;
            Ok(0)
        }
    }
}
