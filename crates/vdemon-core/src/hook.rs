//! Hook event schema and state derivation.
//!
//! Agents append one JSON object per line to the hook-event file; the
//! tailer feeds parsed lines through [`derive_hook_state`] to obtain the
//! deterministic [`HookSignal`] consumed by the estimator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{HookSignal, StateValue};

/// One line of the hook-event JSONL file. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEventLine {
    /// Hook name: "Notification", "Stop", "UserPromptSubmit",
    /// "PreToolUse", "PostToolUse". Other names are dropped.
    pub hook_event_name: String,
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_pane: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,
}

/// Map a hook event to its state signal.
///
/// - Notification with `notification_type = "permission_prompt"` →
///   `WaitingPermission`
/// - Stop → `WaitingInput`
/// - UserPromptSubmit / PreToolUse / PostToolUse → `Running`
///
/// Everything else returns `None` and the line is dropped.
pub fn derive_hook_state(event: &HookEventLine) -> Option<HookSignal> {
    let (state, reason) = match event.hook_event_name.as_str() {
        "Notification" => {
            if event.notification_type.as_deref() == Some("permission_prompt") {
                (StateValue::WaitingPermission, "hook:permission_prompt")
            } else {
                return None;
            }
        }
        "Stop" => (StateValue::WaitingInput, "hook:stop"),
        "UserPromptSubmit" => (StateValue::Running, "hook:user_prompt_submit"),
        "PreToolUse" => (StateValue::Running, "hook:pre_tool_use"),
        "PostToolUse" => (StateValue::Running, "hook:post_tool_use"),
        _ => return None,
    };

    Some(HookSignal {
        state,
        reason: reason.to_owned(),
        at: event.ts,
    })
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(name: &str, notification_type: Option<&str>) -> HookEventLine {
        HookEventLine {
            hook_event_name: name.to_owned(),
            ts: Utc
                .with_ymd_and_hms(2026, 2, 20, 0, 0, 3)
                .single()
                .expect("valid datetime"),
            tmux_pane: Some("%1".to_owned()),
            tty: None,
            cwd: None,
            notification_type: notification_type.map(String::from),
        }
    }

    #[test]
    fn mapping_table() {
        let cases = [
            ("Stop", None, StateValue::WaitingInput, "hook:stop"),
            (
                "UserPromptSubmit",
                None,
                StateValue::Running,
                "hook:user_prompt_submit",
            ),
            ("PreToolUse", None, StateValue::Running, "hook:pre_tool_use"),
            (
                "PostToolUse",
                None,
                StateValue::Running,
                "hook:post_tool_use",
            ),
            (
                "Notification",
                Some("permission_prompt"),
                StateValue::WaitingPermission,
                "hook:permission_prompt",
            ),
        ];
        for (name, ntype, state, reason) in cases {
            let signal =
                derive_hook_state(&sample(name, ntype)).expect("should derive a signal");
            assert_eq!(signal.state, state, "event {name}");
            assert_eq!(signal.reason, reason, "event {name}");
        }
    }

    #[test]
    fn notification_without_permission_prompt_is_dropped() {
        assert!(derive_hook_state(&sample("Notification", None)).is_none());
        assert!(derive_hook_state(&sample("Notification", Some("info"))).is_none());
    }

    #[test]
    fn unknown_events_are_dropped() {
        assert!(derive_hook_state(&sample("SessionStart", None)).is_none());
        assert!(derive_hook_state(&sample("SubagentStop", None)).is_none());
    }

    #[test]
    fn derive_is_idempotent() {
        let event = sample("Stop", None);
        let first = derive_hook_state(&event);
        let second = derive_hook_state(&event);
        assert_eq!(first, second);
    }

    #[test]
    fn signal_carries_event_timestamp() {
        let event = sample("Stop", None);
        let signal = derive_hook_state(&event).expect("signal");
        assert_eq!(signal.at, event.ts);
    }

    #[test]
    fn line_parses_with_unknown_fields() {
        let line = r#"{"hook_event_name":"Stop","ts":"2026-02-20T00:00:03Z","session_id":"abc","extra":42}"#;
        let event: HookEventLine = serde_json::from_str(line).expect("parse");
        assert_eq!(event.hook_event_name, "Stop");
        assert!(event.tmux_pane.is_none());
    }

    #[test]
    fn line_requires_timestamp() {
        let line = r#"{"hook_event_name":"Stop"}"#;
        assert!(serde_json::from_str::<HookEventLine>(line).is_err());
    }
}
