//! Optional TOML config file merged under CLI flags (flags win).

use std::path::Path;

use serde::Deserialize;

use vdemon_core::StateThresholds;
use vdemon_monitor::MonitorConfig;

use crate::cli::DaemonOpts;

/// `<base-dir>/config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub poll_interval_ms: Option<u64>,
    pub running_threshold_ms: Option<i64>,
    pub inactive_threshold_ms: Option<i64>,
    pub fingerprint_lines: Option<usize>,
    pub max_pane_log_bytes: Option<u64>,
    pub retain_rotations: Option<usize>,
    pub max_event_log_bytes: Option<u64>,
}

pub fn load_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

/// Resolve the effective monitor config from defaults, the config file,
/// and CLI flags, in ascending precedence.
pub fn resolve_monitor_config(opts: &DaemonOpts) -> anyhow::Result<MonitorConfig> {
    let mut config = MonitorConfig::default();

    if let Some(base_dir) = &opts.base_dir {
        config.base_dir = base_dir.into();
    }

    let config_path = opts
        .config
        .as_ref()
        .map(Into::into)
        .unwrap_or_else(|| config.base_dir.join("config.toml"));
    let file = load_file_config(&config_path)?;

    config.poll_interval_ms = opts
        .poll_interval_ms
        .or(file.poll_interval_ms)
        .unwrap_or(config.poll_interval_ms);
    config.thresholds = StateThresholds {
        running_ms: opts
            .running_threshold_ms
            .or(file.running_threshold_ms)
            .unwrap_or(config.thresholds.running_ms),
        inactive_ms: opts
            .inactive_threshold_ms
            .or(file.inactive_threshold_ms)
            .unwrap_or(config.thresholds.inactive_ms),
    };
    if let Some(lines) = file.fingerprint_lines {
        config.fingerprint_lines = lines;
    }
    if let Some(bytes) = file.max_pane_log_bytes {
        config.max_pane_log_bytes = bytes;
    }
    if let Some(keep) = file.retain_rotations {
        config.retain_rotations = keep;
    }
    if let Some(bytes) = file.max_event_log_bytes {
        config.max_event_log_bytes = bytes;
    }

    config.socket_name = opts.tmux_socket_name.clone();
    config.socket_path = opts.tmux_socket.clone();

    Ok(config)
}
