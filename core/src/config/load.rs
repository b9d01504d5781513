use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default binrelay data directory: ~/.binrelay
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".binrelay"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.binrelay/config.toml (highest)
    let data_dir = get_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    if cfg.events_out.path == "./executions.jsonl" {
        let events_dir = data_dir.join("events_out");
        std::fs::create_dir_all(&events_dir)?;
        cfg.events_out.path = events_dir
            .join("executions.jsonl")
            .to_string_lossy()
            .to_string();
    }

    if cfg
        .logging
        .directory
        .as_ref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    // Environment variable overrides (Priority 0: highest)
    apply_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    expand_paths(&mut cfg)?;

    Ok(cfg)
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
    Ok(cfg)
}

/// Applies `BINRELAY_*` overrides read through `lookup`.
pub fn apply_overrides<F>(cfg: &mut AppConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("BINRELAY_TIMEOUT_SECS") {
        cfg.limits.timeout_secs = v
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("BINRELAY_TIMEOUT_SECS: {e}"))?;
    }
    if let Some(v) = get("BINRELAY_MAX_OUTPUT_BYTES") {
        cfg.limits.max_output_bytes = v
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("BINRELAY_MAX_OUTPUT_BYTES: {e}"))?;
    }
    if let Some(v) = get("BINRELAY_WINE") {
        for layer in cfg.platform.layers.iter_mut().filter(|l| l.name == "wine") {
            layer.program = v.clone();
        }
    }
    if let Some(v) = get("BINRELAY_DISPLAY") {
        let n = v.trim().trim_start_matches(':');
        cfg.display.display_number = n
            .parse()
            .map_err(|e| anyhow::anyhow!("BINRELAY_DISPLAY: {e}"))?;
    }
    Ok(())
}

/// Expands `~` and `$VAR` in path-valued settings.
pub fn expand_paths(cfg: &mut AppConfig) -> anyhow::Result<()> {
    cfg.events_out.path = expand(&cfg.events_out.path)?;
    if let Some(dir) = cfg.logging.directory.as_mut() {
        *dir = expand(dir)?;
    }
    if let Some(root) = cfg.display.web_root.as_mut() {
        *root = expand(root)?;
    }
    for layer in cfg.platform.layers.iter_mut() {
        if let Some(prefix) = layer.prefix.as_mut() {
            *prefix = expand(prefix)?;
        }
    }
    Ok(())
}

fn expand(s: &str) -> anyhow::Result<String> {
    Ok(shellexpand::full(s)
        .map_err(|e| anyhow::anyhow!("cannot expand '{s}': {e}"))?
        .into_owned())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut cfg = AppConfig::default();
        apply_overrides(
            &mut cfg,
            env(&[
                ("BINRELAY_TIMEOUT_SECS", "7"),
                ("BINRELAY_MAX_OUTPUT_BYTES", "2048"),
                ("BINRELAY_DISPLAY", ":42"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.limits.timeout_secs, 7);
        assert_eq!(cfg.limits.max_output_bytes, 2048);
        assert_eq!(cfg.display.display_number, 42);
    }

    #[test]
    fn blank_overrides_are_ignored_and_garbage_is_an_error() {
        let mut cfg = AppConfig::default();
        apply_overrides(&mut cfg, env(&[("BINRELAY_TIMEOUT_SECS", "  ")])).unwrap();
        assert_eq!(cfg.limits.timeout_secs, 60);

        assert!(apply_overrides(&mut cfg, env(&[("BINRELAY_TIMEOUT_SECS", "soon")])).is_err());
    }

    #[test]
    fn wine_override_only_touches_wine_layer() {
        let mut cfg: AppConfig = toml::from_str(
            r#"
            [[platform.layers]]
            name = "wine"
            program = "wine"
            extensions = [".exe"]

            [[platform.layers]]
            name = "shell"
            program = "sh"
            extensions = [".sh"]
            "#,
        )
        .unwrap();
        apply_overrides(&mut cfg, env(&[("BINRELAY_WINE", "/opt/wine/bin/wine64")])).unwrap();
        assert_eq!(cfg.platform.layers[0].program, "/opt/wine/bin/wine64");
        assert_eq!(cfg.platform.layers[1].program, "sh");
    }

    #[test]
    fn loads_file_and_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.toml");
        std::fs::File::create(&good)
            .unwrap()
            .write_all(b"[validation]\nmax_file_size = 10\n")
            .unwrap();
        assert_eq!(load_from_path(&good).unwrap().validation.max_file_size, 10);

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[limits\n").unwrap();
        let err = load_from_path(&bad).unwrap_err().to_string();
        assert!(err.contains("bad.toml"), "{err}");
    }
}
