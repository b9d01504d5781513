use binrelay_core::api::{AppConfig, CliError, PlatformResolver};
use binrelay_plugins::factory;

use super::cli::CheckArgs;

/// Prints how the target would be launched. Nothing is spawned.
pub fn check(args: CheckArgs, cfg: AppConfig) -> Result<i32, CliError> {
    cfg.validate()?;
    let resolver = PlatformResolver::new(&cfg.validation, &cfg.platform, factory::build_probe(&cfg));
    let spec = resolver.resolve(&args.target)?;

    if args.json {
        let line = serde_json::to_string(&spec).map_err(|e| CliError::Command(e.to_string()))?;
        println!("{line}");
    } else {
        println!("target:  {}", spec.target.display());
        println!("layer:   {}", spec.layer.as_deref().unwrap_or("native"));
        println!("display: {}", if spec.needs_display { "required" } else { "not needed" });
        println!("command: {}", spec.display_line());
    }
    Ok(0)
}
