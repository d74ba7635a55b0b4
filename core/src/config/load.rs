use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default data directory: ~/.syncbridge
pub fn get_syncbridge_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".syncbridge"))
}

/// File layer only. Callers apply [`apply_env_overrides`] on top once they
/// can report the overrides it ignores.
pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.syncbridge/config.toml (highest)
    let home_dir = get_syncbridge_data_dir()?;
    let home_config = home_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg: AppConfig = if home_config.exists() {
        load_from_file(&home_config)?
    } else if local_config.exists() {
        load_from_file(local_config)?
    } else {
        AppConfig::default()
    };

    if cfg
        .logging
        .directory
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.logging.directory = Some(home_dir.join("logs").to_string_lossy().to_string());
    }

    Ok(cfg)
}

pub fn load_from_file(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<AppConfig>(&s)?;
    anyhow::ensure!(
        cfg.conflict.timeout_secs > 0,
        "conflict.timeout_secs must be at least one second"
    );
    Ok(cfg)
}

/// Environment variable overrides (Priority 0: highest).
///
/// Returns one message per variable that was set but ignored; tracing may not
/// be initialized yet, so logging them is left to the caller.
pub fn apply_env_overrides(cfg: &mut AppConfig) -> Vec<String> {
    apply_overrides_from(cfg, |key| std::env::var(key).ok())
}

fn apply_overrides_from(
    cfg: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<String> {
    let mut ignored = Vec::new();
    if let Some(v) = lookup("SYNCBRIDGE_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }
    if let Some(v) = lookup("SYNCBRIDGE_DATA_DIR") {
        if !v.trim().is_empty() {
            cfg.engine.data_dir = v;
        }
    }
    if let Some(v) = lookup("SYNCBRIDGE_CONFLICT_TIMEOUT_SECS") {
        match v.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => cfg.conflict.timeout_secs = secs,
            _ => ignored.push(format!("ignoring invalid SYNCBRIDGE_CONFLICT_TIMEOUT_SECS={v}")),
        }
    }
    ignored
}
