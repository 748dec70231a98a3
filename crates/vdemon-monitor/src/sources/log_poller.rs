//! Log activity poller: size-delta watching of per-pane log files.
//!
//! Growth emits one `(pane_id, now)` activity event; truncation resets
//! the baseline silently; a missing file is tolerated and retried on the
//! next tick.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// One observed append to a pane log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    pub pane_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct WatchedFile {
    path: PathBuf,
    /// `None` until the first stat; the first observation never emits.
    baseline: Option<u64>,
}

type Listener = Box<dyn Fn(&ActivityEvent) + Send>;

/// Watches N pane log files by size delta. Ticked by a single task, so
/// ticks never overlap; listeners run synchronously in-tick.
#[derive(Default)]
pub struct LogActivityPoller {
    files: HashMap<String, WatchedFile>,
    pending: Vec<ActivityEvent>,
    listeners: Vec<Listener>,
}

impl LogActivityPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pane log. Re-registering the same pane with a different
    /// path replaces the previous registration (baseline reset).
    pub fn register(&mut self, pane_id: &str, path: PathBuf) {
        match self.files.get(pane_id) {
            Some(existing) if existing.path == path => {}
            _ => {
                self.files.insert(
                    pane_id.to_owned(),
                    WatchedFile {
                        path,
                        baseline: None,
                    },
                );
            }
        }
    }

    /// Remove all registrations for a pane.
    pub fn unregister(&mut self, pane_id: &str) {
        self.files.remove(pane_id);
    }

    pub fn is_registered(&self, pane_id: &str) -> bool {
        self.files.contains_key(pane_id)
    }

    pub fn on_activity(&mut self, listener: impl Fn(&ActivityEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// One poll pass over every registered file.
    pub fn poll_once(&mut self, now: DateTime<Utc>) {
        let mut emitted = Vec::new();
        for (pane_id, file) in &mut self.files {
            let size = match fs::metadata(&file.path) {
                Ok(meta) => meta.len(),
                // Missing or locked file: retried next tick.
                Err(_) => continue,
            };
            match file.baseline {
                None => file.baseline = Some(size),
                Some(baseline) if size > baseline => {
                    file.baseline = Some(size);
                    emitted.push(ActivityEvent {
                        pane_id: pane_id.clone(),
                        at: now,
                    });
                }
                Some(baseline) if size < baseline => {
                    // Rotation/truncation: new baseline, no event.
                    file.baseline = Some(size);
                }
                Some(_) => {}
            }
        }
        for event in &emitted {
            for listener in &self.listeners {
                listener(event);
            }
        }
        self.pending.extend(emitted);
    }

    /// Drain events accumulated since the last call.
    pub fn take_events(&mut self) -> Vec<ActivityEvent> {
        std::mem::take(&mut self.pending)
    }
}

impl std::fmt::Debug for LogActivityPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogActivityPoller")
            .field("files", &self.files.len())
            .field("pending", &self.pending.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
