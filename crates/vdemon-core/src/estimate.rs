//! Pane state estimation from poll-side signals.
//!
//! Pure precedence chain over the inputs; no clock access — `now` is a
//! parameter so replay tests stay deterministic.

use chrono::{DateTime, Utc};

use crate::types::{AgentKind, HookSignal, StateValue};

/// Codex panes redraw aggressively; anything older than this is not
/// "recent output" regardless of the configured threshold.
pub const CODEX_RUNNING_CLAMP_MS: i64 = 10_000;

/// Idle/inactivity thresholds in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateThresholds {
    /// Output newer than this means the agent is actively producing.
    pub running_ms: i64,
    /// Output older than `running_ms` but newer than this means the agent
    /// is waiting for input; beyond it the pane is treated as a shell.
    pub inactive_ms: i64,
}

impl Default for StateThresholds {
    fn default() -> Self {
        Self {
            running_ms: 15_000,
            inactive_ms: 30 * 60 * 1000,
        }
    }
}

/// Estimate `(state, reason)` for a pane.
///
/// Precedence, first match wins:
/// 1. dead pane → `(Shell, "pane_dead")`
/// 2. hook signal present → the signal's `(state, reason)`
/// 3. no output ever observed → `(Unknown, "no_output")`
/// 4. output within `running_ms` → `(Running, "recent_output")`
/// 5. output within `inactive_ms` → `(WaitingInput, "idle")`
/// 6. otherwise → `(Shell, "inactive_timeout")`
pub fn estimate(
    agent: AgentKind,
    pane_dead: bool,
    last_output_at: Option<DateTime<Utc>>,
    hook_signal: Option<&HookSignal>,
    thresholds: StateThresholds,
    now: DateTime<Utc>,
) -> (StateValue, String) {
    if pane_dead {
        return (StateValue::Shell, "pane_dead".to_owned());
    }

    if let Some(signal) = hook_signal {
        return (signal.state, signal.reason.clone());
    }

    let Some(output_at) = last_output_at else {
        return (StateValue::Unknown, "no_output".to_owned());
    };

    let running_ms = match agent {
        AgentKind::Codex => thresholds.running_ms.min(CODEX_RUNNING_CLAMP_MS),
        _ => thresholds.running_ms,
    };

    let age_ms = (now - output_at).num_milliseconds();
    if age_ms <= running_ms {
        (StateValue::Running, "recent_output".to_owned())
    } else if age_ms <= thresholds.inactive_ms {
        (StateValue::WaitingInput, "idle".to_owned())
    } else {
        (StateValue::Shell, "inactive_timeout".to_owned())
    }
}

// ─── Tests ────────────────────────────────────────────────────────
