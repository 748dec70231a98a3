//! Command injection: text, named keys, and raw key sequences.

use serde::{Deserialize, Serialize};

use crate::error::MuxError;
use crate::executor::MuxCommandRunner;

/// Result reported back to the transport for a send call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SendOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// One element of a raw send: literal text or a named key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RawItem {
    Text(String),
    Key(String),
}

/// Named keys deliverable without the unsafe flag. Anything else (control
/// chords, prefix keys) requires the caller to pass `allow_unsafe`.
const SAFE_KEYS: &[&str] = &[
    "Enter", "Tab", "BTab", "Escape", "Space", "BSpace", "Up", "Down", "Left", "Right", "Home",
    "End", "PageUp", "PageDown",
];

fn is_safe_key(key: &str) -> bool {
    SAFE_KEYS.contains(&key)
}

/// Send literal text, optionally followed by Enter.
pub fn send_text(
    runner: &impl MuxCommandRunner,
    pane_id: &str,
    text: &str,
    press_enter: bool,
) -> SendOutcome {
    if let Err(e) = runner.run(&["send-keys", "-t", pane_id, "-l", "--", text]) {
        return SendOutcome::failed(e.to_string());
    }
    if press_enter
        && let Err(e) = runner.run(&["send-keys", "-t", pane_id, "Enter"])
    {
        return SendOutcome::failed(e.to_string());
    }
    SendOutcome::ok()
}

/// Send a sequence of named keys.
pub fn send_keys(runner: &impl MuxCommandRunner, pane_id: &str, keys: &[String]) -> SendOutcome {
    if keys.is_empty() {
        return SendOutcome::failed("no keys given");
    }
    let mut args = vec!["send-keys", "-t", pane_id];
    args.extend(keys.iter().map(String::as_str));
    match runner.run(&args) {
        Ok(_) => SendOutcome::ok(),
        Err(e) => SendOutcome::failed(e.to_string()),
    }
}

/// Send a mixed sequence of text and named keys. Keys outside the safe
/// table are rejected unless `allow_unsafe` is set.
pub fn send_raw(
    runner: &impl MuxCommandRunner,
    pane_id: &str,
    items: &[RawItem],
    allow_unsafe: bool,
) -> SendOutcome {
    if items.is_empty() {
        return SendOutcome::failed("no items given");
    }
    for item in items {
        if let RawItem::Key(key) = item
            && !allow_unsafe
            && !is_safe_key(key)
        {
            return SendOutcome::failed(format!("key {key:?} requires unsafe mode"));
        }
    }
    for item in items {
        let result = match item {
            RawItem::Text(text) => runner.run(&["send-keys", "-t", pane_id, "-l", "--", text]),
            RawItem::Key(key) => runner.run(&["send-keys", "-t", pane_id, key]),
        };
        if let Err(e) = result {
            return SendOutcome::failed(e.to_string());
        }
    }
    SendOutcome::ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingRunner {
        calls: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl RecordingRunner {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl MuxCommandRunner for RecordingRunner {
        fn run(&self, args: &[&str]) -> Result<String, MuxError> {
            self.calls
                .lock()
                .expect("lock")
                .push(args.iter().map(|s| s.to_string()).collect());
            if self.fail {
                Err(MuxError::CommandFailed("boom".to_owned()))
            } else {
                Ok(String::new())
            }
        }
    }

    #[test]
    fn send_text_with_enter_issues_two_commands() {
        let runner = RecordingRunner::new();
        let outcome = send_text(&runner, "%1", "hello world", true);
        assert!(outcome.ok);
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains(&"-l".to_owned()));
        assert!(calls[0].contains(&"hello world".to_owned()));
        assert_eq!(calls[1].last().map(String::as_str), Some("Enter"));
    }

    #[test]
    fn send_text_without_enter() {
        let runner = RecordingRunner::new();
        let outcome = send_text(&runner, "%1", "y", false);
        assert!(outcome.ok);
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn send_text_failure_reports_error() {
        let runner = RecordingRunner::failing();
        let outcome = send_text(&runner, "%1", "x", false);
        assert!(!outcome.ok);
        assert!(outcome.error.expect("error").contains("boom"));
    }

    #[test]
    fn send_keys_rejects_empty() {
        let runner = RecordingRunner::new();
        assert!(!send_keys(&runner, "%1", &[]).ok);
    }

    #[test]
    fn send_keys_passes_sequence() {
        let runner = RecordingRunner::new();
        let keys = vec!["Up".to_owned(), "Enter".to_owned()];
        assert!(send_keys(&runner, "%1", &keys).ok);
        let calls = runner.calls();
        assert_eq!(calls[0][3..], ["Up".to_owned(), "Enter".to_owned()]);
    }

    #[test]
    fn send_raw_gates_unsafe_keys() {
        let runner = RecordingRunner::new();
        let items = vec![RawItem::Key("C-c".to_owned())];
        let outcome = send_raw(&runner, "%1", &items, false);
        assert!(!outcome.ok);
        assert!(runner.calls().is_empty(), "rejected before any send");

        let outcome = send_raw(&runner, "%1", &items, true);
        assert!(outcome.ok);
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn send_raw_mixed_items() {
        let runner = RecordingRunner::new();
        let items = vec![
            RawItem::Text("ls -la".to_owned()),
            RawItem::Key("Enter".to_owned()),
        ];
        assert!(send_raw(&runner, "%1", &items, false).ok);
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains(&"ls -la".to_owned()));
    }

    #[test]
    fn raw_item_serde_shape() {
        let json = serde_json::to_string(&RawItem::Key("Enter".to_owned())).expect("serialize");
        assert_eq!(json, r#"{"kind":"key","value":"Enter"}"#);
    }
}
