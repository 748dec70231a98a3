//! Error types for the multiplexer backends.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MuxError {
    /// The backend binary could not be invoked or the server is gone.
    #[error("multiplexer backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("multiplexer command failed: {0}")]
    CommandFailed(String),

    #[error("failed to parse pane listing line {line_num}: {detail}")]
    ParseError { line_num: usize, detail: String },

    #[error("multiplexer io error: {0}")]
    Io(#[from] std::io::Error),
}
