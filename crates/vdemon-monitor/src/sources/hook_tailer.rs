//! JSONL hook tailer: incremental reads of the append-only hook-event
//! file with partial-line buffering and truncate/rotation reset.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

/// Tails a single hook-event file, maintaining `(offset, buffer)`.
#[derive(Debug)]
pub struct HookTailer {
    path: PathBuf,
    offset: u64,
    buffer: String,
}

impl HookTailer {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            buffer: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One tail pass:
    /// 1. stat; size < offset resets `(offset, buffer)` (rotation)
    /// 2. size == offset: nothing new
    /// 3. read `[offset, size)`, buffer the trailing fragment, return
    ///    complete lines, advance offset.
    pub fn poll_once(&mut self) -> Vec<String> {
        let size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return Vec::new(),
        };

        if size < self.offset {
            self.offset = 0;
            self.buffer.clear();
        }
        if size == self.offset {
            return Vec::new();
        }

        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to open hook-event file");
                return Vec::new();
            }
        };
        if let Err(e) = file.seek(SeekFrom::Start(self.offset)) {
            warn!(path = %self.path.display(), error = %e, "failed to seek hook-event file");
            return Vec::new();
        }

        let mut chunk = Vec::with_capacity((size - self.offset) as usize);
        if let Err(e) = file.take(size - self.offset).read_to_end(&mut chunk) {
            warn!(path = %self.path.display(), error = %e, "failed to read hook-event file");
            return Vec::new();
        }
        self.offset += chunk.len() as u64;
        self.buffer.push_str(&String::from_utf8_lossy(&chunk));

        let mut lines: Vec<String> = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches('\n');
            if !line.is_empty() {
                lines.push(line.to_owned());
            }
        }
        lines
    }
}
