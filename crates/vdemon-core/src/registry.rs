//! Session registry: keyed map of pane id → [`SessionDetail`] with
//! synchronous change/removal observers.
//!
//! Observers register into the registry; they hold no back-pointers, so
//! the monitor ↔ dispatcher/broadcaster coupling stays one-directional.

use std::collections::{HashMap, HashSet};

use crate::types::SessionDetail;

type ChangedObserver = Box<dyn Fn(&SessionDetail) + Send>;
type RemovedObserver = Box<dyn Fn(&str) + Send>;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, SessionDetail>,
    changed: Vec<ChangedObserver>,
    removed: Vec<RemovedObserver>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a detail. Idempotent on an equal value; on
    /// inequality the entry is replaced and `on_changed` observers fire.
    /// Returns `true` when the entry changed.
    pub fn update(&mut self, detail: SessionDetail) -> bool {
        if self.sessions.get(&detail.pane_id) == Some(&detail) {
            return false;
        }
        self.sessions.insert(detail.pane_id.clone(), detail.clone());
        for observer in &self.changed {
            observer(&detail);
        }
        true
    }

    /// Drop a pane and fire `on_removed`. Returns `false` for unknown ids.
    pub fn remove(&mut self, pane_id: &str) -> bool {
        if self.sessions.remove(pane_id).is_none() {
            return false;
        }
        for observer in &self.removed {
            observer(pane_id);
        }
        true
    }

    /// Remove every pane not present in `active_ids`; returns the removed
    /// ids. Observer order follows removal order; iteration order is
    /// unspecified.
    pub fn remove_missing(&mut self, active_ids: &HashSet<String>) -> Vec<String> {
        let stale: Vec<String> = self
            .sessions
            .keys()
            .filter(|id| !active_ids.contains(*id))
            .cloned()
            .collect();
        for id in &stale {
            self.remove(id);
        }
        stale
    }

    pub fn get_detail(&self, pane_id: &str) -> Option<&SessionDetail> {
        self.sessions.get(pane_id)
    }

    pub fn snapshot(&self) -> Vec<SessionDetail> {
        self.sessions.values().cloned().collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &SessionDetail> {
        self.sessions.values()
    }

    pub fn contains(&self, pane_id: &str) -> bool {
        self.sessions.contains_key(pane_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn on_changed(&mut self, observer: impl Fn(&SessionDetail) + Send + 'static) {
        self.changed.push(Box::new(observer));
    }

    pub fn on_removed(&mut self, observer: impl Fn(&str) + Send + 'static) {
        self.removed.push(Box::new(observer));
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("changed_observers", &self.changed.len())
            .field("removed_observers", &self.removed.len())
            .finish()
    }
}

// ─── Tests ────────────────────────────────────────────────────────
