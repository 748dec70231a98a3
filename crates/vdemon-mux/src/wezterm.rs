//! Wezterm implementation of the adapter capability set.
//!
//! Pane metadata comes from `wezterm cli list --format json`. Wezterm has
//! no pipe-pane equivalent, so attach reports not-attached and activity
//! detection falls back to the fingerprint sampler.

use std::path::Path;

use serde::Deserialize;

use crate::adapter::MuxAdapter;
use crate::error::MuxError;
use crate::executor::MuxCommandRunner;
use crate::pane_info::PaneInfo;
use crate::pipe::AttachOutcome;
use crate::send::{RawItem, SendOutcome};

/// One entry of `wezterm cli list --format json`. Unknown fields ignored.
#[derive(Debug, Clone, Deserialize)]
struct WeztermPaneEntry {
    pane_id: u64,
    window_id: u64,
    tab_id: u64,
    #[serde(default)]
    workspace: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    cwd: String,
    #[serde(default)]
    tty_name: Option<String>,
    #[serde(default)]
    is_active: bool,
}

/// Wezterm adapter over a mock-injectable command runner. The runner is
/// expected to prepend `wezterm cli` (see `WeztermExecutor`).
pub struct WeztermAdapter<R: MuxCommandRunner> {
    runner: R,
}

impl<R: MuxCommandRunner> WeztermAdapter<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

fn cwd_to_path(cwd: &str) -> String {
    // wezterm reports cwd as a file:// URL with a host component.
    cwd.strip_prefix("file://")
        .map(|rest| match rest.find('/') {
            Some(idx) => rest[idx..].to_owned(),
            None => rest.to_owned(),
        })
        .unwrap_or_else(|| cwd.to_owned())
}

fn entry_to_pane_info(entry: &WeztermPaneEntry) -> PaneInfo {
    PaneInfo {
        pane_id: entry.pane_id.to_string(),
        session_name: if entry.workspace.is_empty() {
            "default".to_owned()
        } else {
            entry.workspace.clone()
        },
        window_index: u32::try_from(entry.window_id).unwrap_or(0),
        pane_index: u32::try_from(entry.tab_id).unwrap_or(0),
        pane_active: entry.is_active,
        current_command: String::new(),
        current_path: cwd_to_path(&entry.cwd),
        pane_tty: entry.tty_name.clone().unwrap_or_default(),
        pane_title: entry.title.clone(),
        pane_pid: None,
        pane_start_command: String::new(),
        pane_dead: false,
        alternate_on: false,
        window_activity: None,
        pane_pipe: String::new(),
        pipe_tag_value: None,
    }
}

impl<R: MuxCommandRunner> MuxAdapter for WeztermAdapter<R> {
    fn list_panes(&self) -> Result<Vec<PaneInfo>, MuxError> {
        let output = self.runner.run(&["list", "--format", "json"])?;
        let entries: Vec<WeztermPaneEntry> = serde_json::from_str(&output)
            .map_err(|e| MuxError::CommandFailed(format!("wezterm list parse: {e}")))?;
        Ok(entries.iter().map(entry_to_pane_info).collect())
    }

    fn read_user_option(&self, _pane_id: &str, _key: &str) -> Result<Option<String>, MuxError> {
        // No per-pane user options in wezterm.
        Ok(None)
    }

    fn attach_pipe(
        &self,
        _pane_id: &str,
        _log_path: &Path,
        _current: &PaneInfo,
    ) -> Result<AttachOutcome, MuxError> {
        // No pipe-pane equivalent; the fingerprint sampler covers activity.
        Ok(AttachOutcome {
            attached: false,
            conflict: false,
        })
    }

    fn capture_tail(&self, pane_id: &str, _use_alt: bool) -> Option<String> {
        self.runner
            .run(&["get-text", "--pane-id", pane_id])
            .ok()
    }

    fn send_text(&self, pane_id: &str, text: &str, press_enter: bool) -> SendOutcome {
        let payload = if press_enter {
            format!("{text}\r")
        } else {
            text.to_owned()
        };
        match self
            .runner
            .run(&["send-text", "--pane-id", pane_id, "--no-paste", "--", &payload])
        {
            Ok(_) => SendOutcome::ok(),
            Err(e) => SendOutcome::failed(e.to_string()),
        }
    }

    fn send_keys(&self, pane_id: &str, keys: &[String]) -> SendOutcome {
        // wezterm cli has no named-key send; map the common ones to their
        // control sequences and send as text.
        let mut payload = String::new();
        for key in keys {
            match key_to_sequence(key) {
                Some(seq) => payload.push_str(seq),
                None => return SendOutcome::failed(format!("unsupported key {key:?}")),
            }
        }
        match self
            .runner
            .run(&["send-text", "--pane-id", pane_id, "--no-paste", "--", &payload])
        {
            Ok(_) => SendOutcome::ok(),
            Err(e) => SendOutcome::failed(e.to_string()),
        }
    }

    fn send_raw(&self, pane_id: &str, items: &[RawItem], _allow_unsafe: bool) -> SendOutcome {
        for item in items {
            let outcome = match item {
                RawItem::Text(text) => self.send_text(pane_id, text, false),
                RawItem::Key(key) => self.send_keys(pane_id, std::slice::from_ref(key)),
            };
            if !outcome.ok {
                return outcome;
            }
        }
        SendOutcome::ok()
    }

    fn kill_pane(&self, pane_id: &str) -> Result<(), MuxError> {
        self.runner
            .run(&["kill-pane", "--pane-id", pane_id])
            .map(|_| ())
    }
}

fn key_to_sequence(key: &str) -> Option<&'static str> {
    match key {
        "Enter" => Some("\r"),
        "Tab" => Some("\t"),
        "Escape" => Some("\x1b"),
        "Space" => Some(" "),
        "BSpace" => Some("\x7f"),
        "Up" => Some("\x1b[A"),
        "Down" => Some("\x1b[B"),
        "Right" => Some("\x1b[C"),
        "Left" => Some("\x1b[D"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockRunner(String);

    impl MuxCommandRunner for MockRunner {
        fn run(&self, _args: &[&str]) -> Result<String, MuxError> {
            Ok(self.0.clone())
        }
    }

    const LIST_JSON: &str = r#"[
        {"window_id":0,"tab_id":0,"pane_id":3,"workspace":"dev",
         "title":"claude","cwd":"file://host/home/user/project",
         "tty_name":"/dev/ttys007","is_active":true,"size":{"rows":40,"cols":120}}
    ]"#;

    #[test]
    fn list_parses_wezterm_json() {
        let adapter = WeztermAdapter::new(MockRunner(LIST_JSON.to_owned()));
        let panes = adapter.list_panes().expect("list");
        assert_eq!(panes.len(), 1);
        let pane = &panes[0];
        assert_eq!(pane.pane_id, "3");
        assert_eq!(pane.session_name, "dev");
        assert_eq!(pane.current_path, "/home/user/project");
        assert_eq!(pane.pane_tty, "/dev/ttys007");
        assert_eq!(pane.pane_title, "claude");
        assert!(pane.pane_active);
    }

    #[test]
    fn cwd_without_host_component() {
        assert_eq!(cwd_to_path("file:///tmp"), "/tmp");
        assert_eq!(cwd_to_path("/already/plain"), "/already/plain");
    }

    #[test]
    fn attach_pipe_is_unsupported_not_an_error() {
        let adapter = WeztermAdapter::new(MockRunner(String::new()));
        let outcome = adapter
            .attach_pipe("3", Path::new("/tmp/p.log"), &PaneInfo::default())
            .expect("attach");
        assert!(!outcome.attached);
        assert!(!outcome.conflict);
    }

    #[test]
    fn send_keys_maps_named_keys() {
        let adapter = WeztermAdapter::new(MockRunner(String::new()));
        let outcome = adapter.send_keys("3", &["Up".to_owned(), "Enter".to_owned()]);
        assert!(outcome.ok);
        let outcome = adapter.send_keys("3", &["F13".to_owned()]);
        assert!(!outcome.ok);
    }

    #[test]
    fn list_rejects_malformed_json() {
        let adapter = WeztermAdapter::new(MockRunner("not json".to_owned()));
        assert!(adapter.list_panes().is_err());
    }
}
