//! Asynchronous input sources feeding the monitor loop.

pub mod fingerprint;
pub mod hook_tailer;
pub mod log_poller;

pub use hook_tailer::HookTailer;
pub use log_poller::{ActivityEvent, LogActivityPoller};
