//! Pipe attachment: routing pane output to a log file via `pipe-pane`,
//! tagged with a per-pane user option so attachment stays idempotent
//! across monitor restarts.

use std::path::Path;

use crate::error::MuxError;
use crate::executor::MuxCommandRunner;
use crate::pane_info::PaneInfo;

/// Per-pane user option set to "1" once this monitor attached a pipe.
pub const PIPE_TAG_OPTION: &str = "@vde-monitor_pipe";

/// Tag value written on successful attach.
pub const PIPE_TAG_ATTACHED: &str = "1";

/// Outcome of an attach attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachOutcome {
    pub attached: bool,
    pub conflict: bool,
}

/// A foreign pipe is one attached to the pane without our tag.
pub fn has_conflict(current: &PaneInfo) -> bool {
    !current.pane_pipe.is_empty()
        && current.pipe_tag_value.as_deref() != Some(PIPE_TAG_ATTACHED)
}

/// Attach a pipe routing pane output to `log_path`. Idempotent:
///
/// - tag already "1" → nothing to do, reports attached
/// - foreign pipe present → conflict, no attach
/// - otherwise `pipe-pane -o 'cat >> log'` then the tag is set to "1"
pub fn attach_pipe(
    runner: &impl MuxCommandRunner,
    pane_id: &str,
    log_path: &Path,
    current: &PaneInfo,
) -> Result<AttachOutcome, MuxError> {
    if current.pipe_tag_value.as_deref() == Some(PIPE_TAG_ATTACHED) {
        return Ok(AttachOutcome {
            attached: true,
            conflict: false,
        });
    }
    if has_conflict(current) {
        return Ok(AttachOutcome {
            attached: false,
            conflict: true,
        });
    }

    let pipe_cmd = format!("cat >> '{}'", log_path.display());
    runner.run(&["pipe-pane", "-t", pane_id, "-o", &pipe_cmd])?;
    runner.run(&[
        "set-option",
        "-p",
        "-t",
        pane_id,
        PIPE_TAG_OPTION,
        PIPE_TAG_ATTACHED,
    ])?;

    Ok(AttachOutcome {
        attached: true,
        conflict: false,
    })
}

/// Read a per-pane user option; `None` when unset.
pub fn read_user_option(
    runner: &impl MuxCommandRunner,
    pane_id: &str,
    key: &str,
) -> Result<Option<String>, MuxError> {
    let output = runner.run(&["show-options", "-pqv", "-t", pane_id, key])?;
    let value = output.trim();
    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(value.to_owned()))
    }
}
