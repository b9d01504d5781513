use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "binrelay", version, about = "Run untrusted binaries under supervision")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Load this config file instead of ~/.binrelay/config.toml and ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    pub target: PathBuf,

    /// Arguments as a single line, split on whitespace.
    #[arg(long = "args")]
    pub args_line: Option<String>,

    /// Arguments passed through verbatim (after `--`).
    #[arg(last = true)]
    pub argv: Vec<String>,

    #[arg(long)]
    pub id: Option<String>,

    /// Overrides limits.timeout_secs.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Overrides limits.max_output_bytes.
    #[arg(long)]
    pub max_output: Option<u64>,

    /// Print events as JSON lines instead of text.
    #[arg(long)]
    pub json: bool,

    /// Recorded as the requester in the execution log.
    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub cwd: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CheckArgs {
    pub target: PathBuf,

    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayAction {
    /// Start the display and keep it up until Ctrl-C.
    Start,
    /// Show the configured display and which stages this host can run.
    Status,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DisplayArgs {
    #[command(subcommand)]
    pub action: DisplayAction,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate, resolve and run a target, streaming its output.
    Run(RunArgs),
    /// Validate and resolve a target without running it.
    Check(CheckArgs),
    /// Virtual display diagnostics.
    Display(DisplayArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_line_and_trailing_args() {
        let args = Args::parse_from([
            "binrelay", "run", "calc.exe", "--args", "-a -b", "--timeout", "5", "--", "-c", "x y",
        ]);
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.target, PathBuf::from("calc.exe"));
        assert_eq!(run.args_line.as_deref(), Some("-a -b"));
        assert_eq!(run.argv, vec!["-c", "x y"]);
        assert_eq!(run.timeout, Some(5));
        assert!(!run.json);
    }

    #[test]
    fn display_subcommands_parse() {
        let args = Args::parse_from(["binrelay", "--config", "c.toml", "display", "status"]);
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(
            args.command,
            Commands::Display(DisplayArgs {
                action: DisplayAction::Status
            })
        ));
    }
}
