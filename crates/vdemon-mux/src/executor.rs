//! MuxCommandRunner trait and subprocess executors.
//! The trait boundary enables mock injection for testing.

use std::process::Command;

use crate::error::MuxError;

/// Trait for executing multiplexer commands.
pub trait MuxCommandRunner: Send + Sync {
    fn run(&self, args: &[&str]) -> Result<String, MuxError>;
}

impl<T: MuxCommandRunner + ?Sized> MuxCommandRunner for &T {
    fn run(&self, args: &[&str]) -> Result<String, MuxError> {
        (**self).run(args)
    }
}

/// Real tmux executor using `std::process::Command`.
#[derive(Debug, Clone)]
pub struct TmuxExecutor {
    tmux_bin: String,
    socket_path: Option<String>,
    socket_name: Option<String>,
}

impl TmuxExecutor {
    pub fn new(tmux_bin: impl Into<String>) -> Self {
        Self {
            tmux_bin: tmux_bin.into(),
            socket_path: None,
            socket_name: None,
        }
    }

    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = Some(name.into());
        self
    }

    pub fn socket_path(&self) -> Option<&str> {
        self.socket_path.as_deref()
    }

    pub fn socket_name(&self) -> Option<&str> {
        self.socket_name.as_deref()
    }
}

impl Default for TmuxExecutor {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl MuxCommandRunner for TmuxExecutor {
    fn run(&self, args: &[&str]) -> Result<String, MuxError> {
        let mut cmd = Command::new(&self.tmux_bin);
        // Socket path takes precedence over socket name
        if let Some(ref path) = self.socket_path {
            cmd.args(["-S", path]);
        } else if let Some(ref name) = self.socket_name {
            cmd.args(["-L", name]);
        }
        cmd.args(args);
        let output = cmd
            .output()
            .map_err(|e| MuxError::BackendUnavailable(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.contains("no server running") || stderr.contains("error connecting") {
                return Err(MuxError::BackendUnavailable(stderr.to_owned()));
            }
            return Err(MuxError::CommandFailed(format!(
                "exit code {}: {stderr}",
                output.status.code().unwrap_or(-1)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Real wezterm executor; all subcommands go through `wezterm cli`.
#[derive(Debug, Clone)]
pub struct WeztermExecutor {
    wezterm_bin: String,
}

impl WeztermExecutor {
    pub fn new(wezterm_bin: impl Into<String>) -> Self {
        Self {
            wezterm_bin: wezterm_bin.into(),
        }
    }
}

impl Default for WeztermExecutor {
    fn default() -> Self {
        Self::new("wezterm")
    }
}

impl MuxCommandRunner for WeztermExecutor {
    fn run(&self, args: &[&str]) -> Result<String, MuxError> {
        let output = Command::new(&self.wezterm_bin)
            .arg("cli")
            .args(args)
            .output()
            .map_err(|e| MuxError::BackendUnavailable(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MuxError::CommandFailed(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
