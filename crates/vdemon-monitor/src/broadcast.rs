//! Broadcaster: forwards registry changes into a fan-out channel the
//! transport layer subscribes to. Push observer only; the WebSocket
//! router itself lives outside this crate.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use vdemon_core::{SessionDetail, SessionRegistry};

/// One registry change, as published to transport subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Changed { detail: Box<SessionDetail> },
    Removed { pane_id: String },
}

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out adapter over `tokio::sync::broadcast`. Slow subscribers drop
/// messages (`Lagged`) rather than stalling the monitor loop.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Register change/removal observers into the registry.
    pub fn attach(&self, registry: &mut SessionRegistry) {
        let changed_tx = self.tx.clone();
        registry.on_changed(move |detail| {
            let _ = changed_tx.send(SessionEvent::Changed {
                detail: Box::new(detail.clone()),
            });
        });

        let removed_tx = self.tx.clone();
        registry.on_removed(move |pane_id| {
            let _ = removed_tx.send(SessionEvent::Removed {
                pane_id: pane_id.to_owned(),
            });
        });
    }
}
