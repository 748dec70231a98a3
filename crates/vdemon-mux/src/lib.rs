//! vdemon-mux: multiplexer IO boundary for vde-monitor.
//! Subprocess execution, pane listing/capture, pipe attachment, and
//! command injection for tmux and wezterm. No business logic.

pub mod adapter;
pub mod capture;
pub mod error;
pub mod executor;
pub mod pane_info;
pub mod pipe;
pub mod send;
pub mod wezterm;

pub use adapter::{CAPTURE_TAIL_LINES, MuxAdapter, TmuxAdapter};
pub use capture::capture_tail;
pub use error::MuxError;
pub use executor::{MuxCommandRunner, TmuxExecutor, WeztermExecutor};
pub use pane_info::{LIST_PANES_FORMAT, PaneInfo, list_panes, parse_list_panes_output};
pub use pipe::{AttachOutcome, PIPE_TAG_ATTACHED, PIPE_TAG_OPTION, attach_pipe, has_conflict, read_user_option};
pub use send::{RawItem, SendOutcome, send_keys, send_raw, send_text};
pub use wezterm::WeztermAdapter;
