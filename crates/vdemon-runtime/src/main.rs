//! vdemon: session monitor daemon and CLI for AI-agent terminal panes.

use std::sync::Arc;

use clap::Parser;

use vdemon_monitor::SessionMonitor;
use vdemon_mux::{MuxAdapter, TmuxAdapter, TmuxExecutor, WeztermAdapter, WeztermExecutor};

mod cli;
mod client;
mod file_config;
mod server;
mod setup_hooks;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("VDEMON_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("vdemon daemon starting");

            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Status => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_status(&socket_path).await?;
        }
        cli::Command::SetupHooks(opts) => {
            let config = vdemon_monitor::MonitorConfig::default();
            let default_events = config.hook_events_path();
            let path = setup_hooks::apply_hooks(&opts, &default_events.to_string_lossy())?;
            println!("hooks written to {}", path.display());
        }
    }

    Ok(())
}

fn build_adapter(opts: &cli::DaemonOpts) -> anyhow::Result<Arc<dyn MuxAdapter>> {
    match opts.backend.as_str() {
        "tmux" => {
            let mut executor = TmuxExecutor::default();
            // Socket targeting: --tmux-socket > --tmux-socket-name > env
            if let Some(ref socket) = opts.tmux_socket {
                executor = executor.with_socket_path(socket.clone());
            } else if let Some(ref name) = opts.tmux_socket_name {
                executor = executor.with_socket_name(name.clone());
            } else if let Ok(path) = std::env::var("VDEMON_TMUX_SOCKET_PATH") {
                executor = executor.with_socket_path(path);
            } else if let Ok(name) = std::env::var("VDEMON_TMUX_SOCKET_NAME") {
                executor = executor.with_socket_name(name);
            }
            Ok(Arc::new(TmuxAdapter::new(executor)))
        }
        "wezterm" => Ok(Arc::new(WeztermAdapter::new(WeztermExecutor::default()))),
        other => anyhow::bail!("unknown backend {other:?} (expected \"tmux\" or \"wezterm\")"),
    }
}

async fn run_daemon(opts: cli::DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let config = file_config::resolve_monitor_config(&opts)?;
    let adapter = build_adapter(&opts)?;

    let monitor = Arc::new(SessionMonitor::with_system_probes(config, adapter));
    Arc::clone(&monitor).start().await;

    let server_monitor = Arc::clone(&monitor);
    let server_socket = socket_path.to_string();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_monitor).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = server_handle => {
            tracing::warn!("UDS server exited unexpectedly");
        }
    }

    monitor.stop().await;
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}
