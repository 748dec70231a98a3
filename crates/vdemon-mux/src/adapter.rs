//! The capability set the monitor core is polymorphic over.

use std::path::Path;

use crate::capture;
use crate::error::MuxError;
use crate::executor::MuxCommandRunner;
use crate::pane_info::{self, PaneInfo};
use crate::pipe::{self, AttachOutcome};
use crate::send::{self, RawItem, SendOutcome};

/// Default tail depth for `capture_tail`.
pub const CAPTURE_TAIL_LINES: u32 = 20;

/// Multiplexer capability set. The monitor loop drives `list_panes`;
/// the transport drives the send methods.
pub trait MuxAdapter: Send + Sync {
    fn list_panes(&self) -> Result<Vec<PaneInfo>, MuxError>;

    fn read_user_option(&self, pane_id: &str, key: &str) -> Result<Option<String>, MuxError>;

    /// Idempotent pipe attach; see [`pipe::attach_pipe`].
    fn attach_pipe(
        &self,
        pane_id: &str,
        log_path: &Path,
        current: &PaneInfo,
    ) -> Result<AttachOutcome, MuxError>;

    fn has_conflict(&self, current: &PaneInfo) -> bool {
        pipe::has_conflict(current)
    }

    /// Raw pane tail for fingerprinting; `None` on any capture failure.
    fn capture_tail(&self, pane_id: &str, use_alt: bool) -> Option<String>;

    fn send_text(&self, pane_id: &str, text: &str, press_enter: bool) -> SendOutcome;

    fn send_keys(&self, pane_id: &str, keys: &[String]) -> SendOutcome;

    fn send_raw(&self, pane_id: &str, items: &[RawItem], allow_unsafe: bool) -> SendOutcome;

    fn kill_pane(&self, pane_id: &str) -> Result<(), MuxError>;
}

/// tmux implementation over a mock-injectable command runner.
pub struct TmuxAdapter<R: MuxCommandRunner> {
    runner: R,
    capture_lines: u32,
}

impl<R: MuxCommandRunner> TmuxAdapter<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            capture_lines: CAPTURE_TAIL_LINES,
        }
    }

    #[must_use]
    pub fn with_capture_lines(mut self, lines: u32) -> Self {
        self.capture_lines = lines.max(1);
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

impl<R: MuxCommandRunner> MuxAdapter for TmuxAdapter<R> {
    fn list_panes(&self) -> Result<Vec<PaneInfo>, MuxError> {
        pane_info::list_panes(&self.runner)
    }

    fn read_user_option(&self, pane_id: &str, key: &str) -> Result<Option<String>, MuxError> {
        pipe::read_user_option(&self.runner, pane_id, key)
    }

    fn attach_pipe(
        &self,
        pane_id: &str,
        log_path: &Path,
        current: &PaneInfo,
    ) -> Result<AttachOutcome, MuxError> {
        pipe::attach_pipe(&self.runner, pane_id, log_path, current)
    }

    fn capture_tail(&self, pane_id: &str, use_alt: bool) -> Option<String> {
        capture::capture_tail(&self.runner, pane_id, self.capture_lines, use_alt).ok()
    }

    fn send_text(&self, pane_id: &str, text: &str, press_enter: bool) -> SendOutcome {
        send::send_text(&self.runner, pane_id, text, press_enter)
    }

    fn send_keys(&self, pane_id: &str, keys: &[String]) -> SendOutcome {
        send::send_keys(&self.runner, pane_id, keys)
    }

    fn send_raw(&self, pane_id: &str, items: &[RawItem], allow_unsafe: bool) -> SendOutcome {
        send::send_raw(&self.runner, pane_id, items, allow_unsafe)
    }

    fn kill_pane(&self, pane_id: &str) -> Result<(), MuxError> {
        self.runner.run(&["kill-pane", "-t", pane_id]).map(|_| ())
    }
}
