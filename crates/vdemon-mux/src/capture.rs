//! Pane content capture for fingerprinting and screen reads.

use crate::error::MuxError;
use crate::executor::MuxCommandRunner;

/// Capture the last `lines` lines of a pane. With `use_alt` the
/// alternate screen is read instead of the primary one.
pub fn capture_tail(
    runner: &impl MuxCommandRunner,
    pane_id: &str,
    lines: u32,
    use_alt: bool,
) -> Result<String, MuxError> {
    let start_line = format!("-{lines}");
    let mut args = vec!["capture-pane", "-p"];
    if use_alt {
        args.push("-a");
    }
    args.extend_from_slice(&["-S", &start_line, "-t", pane_id]);
    runner.run(&args)
}
