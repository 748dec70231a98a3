//! Per-pane mutable runtime records feeding the state estimator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use vdemon_core::HookSignal;

/// Mutable record for one active pane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaneState {
    pub last_output_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_input_at: Option<DateTime<Utc>>,
    pub last_message: Option<String>,
    pub hook_signal: Option<HookSignal>,
    /// Last normalized pane-tail hash.
    pub fingerprint: Option<String>,
    // Optional attribution of the agent session behind this pane.
    pub agent_session_id: Option<String>,
    pub agent_session_source: Option<String>,
    pub agent_session_confidence: Option<f64>,
    pub agent_session_observed_at: Option<DateTime<Utc>>,
}

/// Store keyed by pane id. Only the monitor loop and the two transport
/// entry points mutate it.
#[derive(Debug, Default)]
pub struct PaneStateStore {
    states: HashMap<String, PaneState>,
}

impl PaneStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(&mut self, pane_id: &str) -> &mut PaneState {
        self.states.entry(pane_id.to_owned()).or_default()
    }

    pub fn get(&self, pane_id: &str) -> Option<&PaneState> {
        self.states.get(pane_id)
    }

    pub fn get_mut(&mut self, pane_id: &str) -> Option<&mut PaneState> {
        self.states.get_mut(pane_id)
    }

    /// Monotonic output-time update; older observations are ignored.
    pub fn record_output(&mut self, pane_id: &str, at: DateTime<Utc>) {
        let state = self.ensure(pane_id);
        if state.last_output_at.is_none_or(|prev| at > prev) {
            state.last_output_at = Some(at);
        }
    }

    pub fn record_input(&mut self, pane_id: &str, at: DateTime<Utc>) {
        self.ensure(pane_id).last_input_at = Some(at);
    }

    /// Replace (never merge) the hook signal and bump `last_event_at`.
    pub fn set_hook_signal(&mut self, pane_id: &str, signal: HookSignal) {
        let state = self.ensure(pane_id);
        state.last_event_at = Some(signal.at);
        state.hook_signal = Some(signal);
    }

    /// Drop the hook signal once newer output supersedes it.
    pub fn clear_stale_hook_signal(&mut self, pane_id: &str) {
        let Some(state) = self.states.get_mut(pane_id) else {
            return;
        };
        let stale = match (&state.last_output_at, &state.hook_signal) {
            (Some(output_at), Some(signal)) => *output_at > signal.at,
            _ => false,
        };
        if stale {
            state.hook_signal = None;
        }
    }

    pub fn remove(&mut self, pane_id: &str) -> Option<PaneState> {
        self.states.remove(pane_id)
    }

    pub fn pane_ids(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }
}
