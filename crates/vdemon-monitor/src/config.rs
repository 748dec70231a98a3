//! Monitor configuration. Initialized once at construction and treated
//! as immutable for the monitor's lifetime.

use std::path::PathBuf;

use vdemon_core::StateThresholds;

use crate::paths;

/// Tuning knobs for the session monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// State root, usually `~/.vde-monitor`.
    pub base_dir: PathBuf,
    /// Multiplexer socket name (`tmux -L`), part of the server key.
    pub socket_name: Option<String>,
    /// Multiplexer socket path (`tmux -S`), part of the server key.
    pub socket_path: Option<String>,
    /// Monitor loop period.
    pub poll_interval_ms: u64,
    /// Output-age thresholds for state estimation.
    pub thresholds: StateThresholds,
    /// Pane tail depth for fingerprint sampling.
    pub fingerprint_lines: usize,
    /// Pane log rotation threshold.
    pub max_pane_log_bytes: u64,
    /// Rotated pane logs kept per file.
    pub retain_rotations: usize,
    /// Hook-event log rotation threshold.
    pub max_event_log_bytes: u64,
    /// Timeout for metadata-level adapter calls (list, attach).
    pub adapter_timeout_ms: u64,
    /// Timeout for pane-content capture calls.
    pub capture_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_dir: paths::default_base_dir(),
            socket_name: None,
            socket_path: None,
            poll_interval_ms: 1_000,
            thresholds: StateThresholds::default(),
            fingerprint_lines: vdemon_core::DEFAULT_TAIL_LINES,
            max_pane_log_bytes: 2 * 1024 * 1024,
            retain_rotations: 3,
            max_event_log_bytes: 1024 * 1024,
            adapter_timeout_ms: 3_000,
            capture_timeout_ms: 10_000,
        }
    }
}

impl MonitorConfig {
    /// Stable key identifying the multiplexer server this monitor watches.
    pub fn server_key(&self) -> String {
        paths::server_key(self.socket_name.as_deref(), self.socket_path.as_deref())
    }

    pub fn state_path(&self) -> PathBuf {
        self.base_dir.join("state.json")
    }

    pub fn panes_dir(&self) -> PathBuf {
        self.base_dir.join("panes").join(self.server_key())
    }

    pub fn pane_log_path(&self, pane_id: &str) -> PathBuf {
        self.panes_dir()
            .join(format!("{}.log", paths::safe_pane_id(pane_id)))
    }

    pub fn events_dir(&self) -> PathBuf {
        self.base_dir.join("events").join(self.server_key())
    }

    pub fn hook_events_path(&self) -> PathBuf {
        self.events_dir().join("claude.jsonl")
    }
}
