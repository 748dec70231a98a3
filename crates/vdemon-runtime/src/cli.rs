//! CLI definition using clap derive.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vdemon",
    about = "Session monitor and remote control for AI-agent terminal panes"
)]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/vde-monitor/vdemond.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the monitor daemon (poll loop + UDS server)
    Daemon(DaemonOpts),
    /// Show monitored sessions
    Status,
    /// Configure Claude Code hooks to feed the monitor's event file
    SetupHooks(SetupHooksOpts),
}

#[derive(clap::Args, Debug, Default)]
pub struct DaemonOpts {
    /// Monitor loop interval in milliseconds
    #[arg(long, env = "VDEMON_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Multiplexer backend: "tmux" or "wezterm"
    #[arg(long, default_value = "tmux")]
    pub backend: String,

    /// tmux socket path (-S)
    #[arg(long)]
    pub tmux_socket: Option<String>,

    /// tmux socket name (-L)
    #[arg(long)]
    pub tmux_socket_name: Option<String>,

    /// State root directory (default ~/.vde-monitor)
    #[arg(long, env = "VDEMON_BASE_DIR")]
    pub base_dir: Option<String>,

    /// "Recent output" window in milliseconds
    #[arg(long)]
    pub running_threshold_ms: Option<i64>,

    /// Idle window in milliseconds before a pane counts as a shell
    #[arg(long)]
    pub inactive_threshold_ms: Option<i64>,

    /// Optional TOML config file (default <base-dir>/config.toml)
    #[arg(long)]
    pub config: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct SetupHooksOpts {
    /// Scope: "project" writes to .claude/settings.json, "user" to ~/.claude/settings.json
    #[arg(long, default_value = "project")]
    pub scope: String,

    /// Hook-event file the hook command appends to (default: the daemon's)
    #[arg(long)]
    pub events_file: Option<String>,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/vde-monitor/vdemond.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/vde-monitor-{user}/vdemond.sock")
}
