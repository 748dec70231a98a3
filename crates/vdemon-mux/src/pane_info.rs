//! PaneInfo, list-panes format string, and parser.

use serde::{Deserialize, Serialize};

use crate::error::MuxError;
use crate::executor::MuxCommandRunner;

/// Tab-delimited format string for `tmux list-panes -a -F`.
///
/// The two free-text fields sit at the end: the title occupies one slot
/// and the start command absorbs any remaining tab-separated fragments.
pub const LIST_PANES_FORMAT: &str = "#{pane_id}\t#{session_name}\t#{window_index}\t#{pane_index}\t#{pane_active}\t#{pane_current_command}\t#{pane_current_path}\t#{pane_tty}\t#{pane_dead}\t#{alternate_on}\t#{window_activity}\t#{pane_pid}\t#{pane_pipe}\t#{@vde-monitor_pipe}\t#{pane_title}\t#{pane_start_command}";

const FIELD_COUNT: usize = 16;

/// Full metadata for one pane, immutable per sample.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaneInfo {
    pub pane_id: String,
    pub session_name: String,
    pub window_index: u32,
    pub pane_index: u32,
    pub pane_active: bool,
    pub current_command: String,
    pub current_path: String,
    pub pane_tty: String,
    pub pane_title: String,
    pub pane_pid: Option<u32>,
    pub pane_start_command: String,
    pub pane_dead: bool,
    pub alternate_on: bool,
    /// Epoch seconds of last window activity, when the backend reports it.
    pub window_activity: Option<i64>,
    /// Non-empty when some pipe is attached to the pane. tmux only
    /// exposes a flag, so the value carries no command text.
    pub pane_pipe: String,
    /// Our own per-pane tag (`@vde-monitor_pipe`); `Some("1")` after an
    /// attach attempt by this monitor.
    pub pipe_tag_value: Option<String>,
}

/// Execute `list-panes -a` and parse the output.
pub fn list_panes(runner: &impl MuxCommandRunner) -> Result<Vec<PaneInfo>, MuxError> {
    let output = runner.run(&["list-panes", "-a", "-F", LIST_PANES_FORMAT])?;
    parse_list_panes_output(&output)
}

/// Parse the raw output of `list-panes -a -F <FORMAT>`.
pub fn parse_list_panes_output(output: &str) -> Result<Vec<PaneInfo>, MuxError> {
    let mut panes = Vec::new();
    for (idx, line) in output.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        panes.push(parse_line(line, idx + 1)?);
    }
    Ok(panes)
}

fn parse_line(line: &str, line_num: usize) -> Result<PaneInfo, MuxError> {
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < FIELD_COUNT {
        return Err(MuxError::ParseError {
            line_num,
            detail: format!(
                "expected at least {FIELD_COUNT} tab-separated fields, got {}",
                parts.len()
            ),
        });
    }

    let pipe_tag = parts[13].trim();

    Ok(PaneInfo {
        pane_id: parts[0].to_string(),
        session_name: parts[1].to_string(),
        window_index: parts[2].parse().unwrap_or(0),
        pane_index: parts[3].parse().unwrap_or(0),
        pane_active: parse_flag(parts[4]),
        current_command: parts[5].to_string(),
        current_path: parts[6].to_string(),
        pane_tty: parts[7].to_string(),
        pane_dead: parse_flag(parts[8]),
        alternate_on: parse_flag(parts[9]),
        window_activity: parts[10].trim().parse().ok(),
        pane_pid: parts[11].trim().parse().ok(),
        pane_pipe: if parse_flag(parts[12]) {
            parts[12].trim().to_string()
        } else {
            String::new()
        },
        pipe_tag_value: if pipe_tag.is_empty() {
            None
        } else {
            Some(pipe_tag.to_string())
        },
        pane_title: parts[14].to_string(),
        pane_start_command: parts[15..].join("\t"),
    })
}

fn parse_flag(s: &str) -> bool {
    matches!(s.trim(), "1" | "true")
}
