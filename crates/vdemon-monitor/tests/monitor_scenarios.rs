//! End-to-end monitor scenarios driven through a scripted adapter:
//! cold start, output growth, permission hooks, pane removal, editor
//! panes, and restart restore.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use vdemon_core::{AgentKind, HookEventLine, StateThresholds, StateValue, TimelineSource};
use vdemon_monitor::{
    MonitorConfig, PersistedSession, ProcessEntry, ProcessInspector, PushError, PushSender,
    SessionMonitor, StateDocument, persist,
};
use vdemon_mux::{AttachOutcome, MuxAdapter, MuxError, PaneInfo, RawItem, SendOutcome};

// ─── Scripted adapter ────────────────────────────────────────────

#[derive(Default)]
struct MockAdapter {
    panes: Mutex<Vec<PaneInfo>>,
    captures: Mutex<HashMap<String, String>>,
    attach_calls: Mutex<Vec<String>>,
    fail_listing: Mutex<bool>,
}

impl MockAdapter {
    fn set_panes(&self, panes: Vec<PaneInfo>) {
        *self.panes.lock().expect("lock") = panes;
    }

    fn set_capture(&self, pane_id: &str, content: &str) {
        self.captures
            .lock()
            .expect("lock")
            .insert(pane_id.to_owned(), content.to_owned());
    }

    fn set_failing(&self, failing: bool) {
        *self.fail_listing.lock().expect("lock") = failing;
    }

    fn attach_calls(&self) -> Vec<String> {
        self.attach_calls.lock().expect("lock").clone()
    }
}

impl MuxAdapter for MockAdapter {
    fn list_panes(&self) -> Result<Vec<PaneInfo>, MuxError> {
        if *self.fail_listing.lock().expect("lock") {
            return Err(MuxError::BackendUnavailable("no server running".to_owned()));
        }
        Ok(self.panes.lock().expect("lock").clone())
    }

    fn read_user_option(&self, pane_id: &str, _key: &str) -> Result<Option<String>, MuxError> {
        Ok(self
            .panes
            .lock()
            .expect("lock")
            .iter()
            .find(|p| p.pane_id == pane_id)
            .and_then(|p| p.pipe_tag_value.clone()))
    }

    fn attach_pipe(
        &self,
        pane_id: &str,
        _log_path: &Path,
        current: &PaneInfo,
    ) -> Result<AttachOutcome, MuxError> {
        if current.pipe_tag_value.as_deref() == Some("1") {
            return Ok(AttachOutcome {
                attached: true,
                conflict: false,
            });
        }
        if !current.pane_pipe.is_empty() {
            return Ok(AttachOutcome {
                attached: false,
                conflict: true,
            });
        }
        self.attach_calls
            .lock()
            .expect("lock")
            .push(pane_id.to_owned());
        // Mirror tmux: the tag becomes visible in subsequent listings.
        for pane in self.panes.lock().expect("lock").iter_mut() {
            if pane.pane_id == pane_id {
                pane.pane_pipe = "1".to_owned();
                pane.pipe_tag_value = Some("1".to_owned());
            }
        }
        Ok(AttachOutcome {
            attached: true,
            conflict: false,
        })
    }

    fn capture_tail(&self, pane_id: &str, _use_alt: bool) -> Option<String> {
        self.captures.lock().expect("lock").get(pane_id).cloned()
    }

    fn send_text(&self, _pane_id: &str, _text: &str, _press_enter: bool) -> SendOutcome {
        SendOutcome::ok()
    }

    fn send_keys(&self, _pane_id: &str, _keys: &[String]) -> SendOutcome {
        SendOutcome::ok()
    }

    fn send_raw(&self, _pane_id: &str, _items: &[RawItem], _allow_unsafe: bool) -> SendOutcome {
        SendOutcome::ok()
    }

    fn kill_pane(&self, _pane_id: &str) -> Result<(), MuxError> {
        Ok(())
    }
}

struct NoProcesses;

impl ProcessInspector for NoProcesses {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        Vec::new()
    }
}

struct NullPushSender;

impl PushSender for NullPushSender {
    fn send(&self, _url: &str, _payload: &serde_json::Value) -> Result<u16, PushError> {
        Ok(200)
    }
}

// ─── Harness ─────────────────────────────────────────────────────

fn codex_pane(pane_id: &str) -> PaneInfo {
    PaneInfo {
        pane_id: pane_id.to_owned(),
        session_name: "s".to_owned(),
        window_index: 1,
        pane_index: 1,
        pane_active: true,
        current_command: "codex".to_owned(),
        current_path: "/home/user/project".to_owned(),
        pane_tty: "/dev/ttys003".to_owned(),
        pane_title: "codex".to_owned(),
        pane_pid: Some(123),
        pane_start_command: "codex".to_owned(),
        ..PaneInfo::default()
    }
}

struct Harness {
    monitor: Arc<SessionMonitor>,
    adapter: Arc<MockAdapter>,
    config: MonitorConfig,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MonitorConfig {
        base_dir: dir.path().to_path_buf(),
        thresholds: StateThresholds {
            running_ms: 10_000,
            inactive_ms: 600_000,
        },
        ..MonitorConfig::default()
    };
    let adapter = Arc::new(MockAdapter::default());
    let monitor = Arc::new(SessionMonitor::new(
        config.clone(),
        Arc::clone(&adapter) as Arc<dyn MuxAdapter>,
        Arc::new(NoProcesses),
        Arc::new(NullPushSender),
    ));
    Harness {
        monitor,
        adapter,
        config,
        _dir: dir,
    }
}

// ─── Scenarios ───────────────────────────────────────────────────

#[tokio::test]
async fn cold_start_with_one_codex_pane() {
    let h = harness();
    h.adapter.set_panes(vec![codex_pane("%1")]);

    h.monitor.tick_once().await;

    let detail = h.monitor.get_detail("%1").await.expect("registered");
    assert_eq!(detail.agent, AgentKind::Codex);
    assert_eq!(detail.state, StateValue::Unknown);
    assert_eq!(detail.state_reason, "no_output");
    assert!(detail.pipe_attached);
    assert!(!detail.pipe_conflict);
    assert_eq!(h.adapter.attach_calls(), vec!["%1".to_owned()]);

    let view = h
        .monitor
        .get_state_timeline("%1", vdemon_core::TimelineRange::Hour, 200)
        .await;
    let current = view.current.expect("current event");
    assert_eq!(current.state, StateValue::Unknown);
    assert_eq!(current.reason, "no_output");
    assert_eq!(current.source, TimelineSource::Poll);
    assert!(current.ended_at.is_none());
    assert_eq!(view.items.len(), 1);
}

#[tokio::test]
async fn log_growth_transitions_to_running() {
    let h = harness();
    h.adapter.set_panes(vec![codex_pane("%1")]);

    h.monitor.tick_once().await;
    h.monitor.poll_logs_once().await; // baseline

    let mut change_rx = h.monitor.subscribe();

    // The pane log grows by 128 bytes.
    let log_path = h.config.pane_log_path("%1");
    let mut existing = std::fs::read(&log_path).expect("log exists");
    existing.extend_from_slice(&[b'x'; 128]);
    std::fs::write(&log_path, existing).expect("append");

    h.monitor.poll_logs_once().await; // activity event
    h.monitor.tick_once().await;

    let detail = h.monitor.get_detail("%1").await.expect("registered");
    assert_eq!(detail.state, StateValue::Running);
    assert_eq!(detail.state_reason, "recent_output");
    assert!(detail.last_output_at.is_some());

    // Timeline closed UNKNOWN and opened RUNNING.
    let view = h
        .monitor
        .get_state_timeline("%1", vdemon_core::TimelineRange::Hour, 200)
        .await;
    assert_eq!(view.items.len(), 2);
    assert!(view.items[0].ended_at.is_some());
    assert_eq!(view.current.expect("current").state, StateValue::Running);

    // Exactly one change event for the transition.
    let mut running_changes = 0;
    while let Ok(event) = change_rx.try_recv() {
        if let vdemon_monitor::SessionEvent::Changed { detail } = event
            && detail.state == StateValue::Running
        {
            running_changes += 1;
        }
    }
    assert_eq!(running_changes, 1);
}

#[tokio::test]
async fn permission_prompt_hook_drives_state() {
    let h = harness();
    h.adapter.set_panes(vec![codex_pane("%1")]);
    h.monitor.tick_once().await;

    // Hook line lands in the events file between ticks.
    let events_path = h.config.hook_events_path();
    std::fs::create_dir_all(events_path.parent().expect("parent")).expect("mkdir");
    std::fs::write(
        &events_path,
        format!(
            "{}\n",
            serde_json::json!({
                "hook_event_name": "Notification",
                "notification_type": "permission_prompt",
                "tmux_pane": "%1",
                "ts": "2026-02-20T00:00:03Z",
            })
        ),
    )
    .expect("write hook");

    h.monitor.drain_hook_events().await;
    h.monitor.tick_once().await;

    let detail = h.monitor.get_detail("%1").await.expect("registered");
    assert_eq!(detail.state, StateValue::WaitingPermission);
    assert_eq!(detail.state_reason, "hook:permission_prompt");

    let view = h
        .monitor
        .get_state_timeline("%1", vdemon_core::TimelineRange::Hour, 200)
        .await;
    let current = view.current.expect("current");
    assert_eq!(current.source, TimelineSource::Hook);
}

#[tokio::test]
async fn transport_hook_event_is_equivalent_to_tailed_one() {
    let h = harness();
    h.adapter.set_panes(vec![codex_pane("%1")]);
    h.monitor.tick_once().await;

    h.monitor
        .handle_hook_event(HookEventLine {
            hook_event_name: "Stop".to_owned(),
            ts: Utc::now(),
            tmux_pane: Some("%1".to_owned()),
            tty: None,
            cwd: None,
            notification_type: None,
        })
        .await;
    h.monitor.tick_once().await;

    let detail = h.monitor.get_detail("%1").await.expect("registered");
    assert_eq!(detail.state, StateValue::WaitingInput);
    assert_eq!(detail.state_reason, "hook:stop");
}

#[tokio::test]
async fn disappearing_pane_is_removed_and_closed() {
    let h = harness();
    h.adapter.set_panes(vec![codex_pane("%1")]);
    h.monitor.tick_once().await;
    h.monitor
        .set_custom_title("%1", Some("deploy".to_owned()))
        .await;

    let mut change_rx = h.monitor.subscribe();
    h.adapter.set_panes(Vec::new());
    h.monitor.tick_once().await;

    assert!(h.monitor.get_detail("%1").await.is_none());

    let mut removed = false;
    while let Ok(event) = change_rx.try_recv() {
        if let vdemon_monitor::SessionEvent::Removed { pane_id } = event {
            assert_eq!(pane_id, "%1");
            removed = true;
        }
    }
    assert!(removed, "removal event published");

    let view = h
        .monitor
        .get_state_timeline("%1", vdemon_core::TimelineRange::Hour, 200)
        .await;
    assert!(view.current.is_none(), "current interval closed");

    // State file rewritten without the pane.
    let document = persist::load_state(&h.config.state_path()).expect("state file");
    assert!(document.sessions.is_empty());
}

#[tokio::test]
async fn editor_pane_is_ignored() {
    let h = harness();
    let mut editor = codex_pane("%2");
    editor.current_command = "nvim".to_owned();
    editor.pane_title = "README.md".to_owned();
    editor.pane_start_command = "nvim README.md".to_owned();
    h.adapter.set_panes(vec![editor]);

    h.monitor.tick_once().await;

    assert!(h.monitor.get_detail("%2").await.is_none());
    assert!(h.adapter.attach_calls().is_empty());
    assert!(h.monitor.snapshot().await.is_empty());
}

#[tokio::test]
async fn restart_restores_state_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MonitorConfig {
        base_dir: dir.path().to_path_buf(),
        ..MonitorConfig::default()
    };

    // A previous run persisted %1 as WAITING_INPUT/idle, no timeline.
    let mut sessions = HashMap::new();
    sessions.insert(
        "%1".to_owned(),
        PersistedSession {
            last_output_at: Some(Utc::now() - Duration::seconds(60)),
            custom_title: Some("deploy".to_owned()),
            state: StateValue::WaitingInput,
            state_reason: "idle".to_owned(),
            ..PersistedSession::default()
        },
    );
    persist::save_state(
        &config.state_path(),
        &StateDocument {
            version: vdemon_monitor::STATE_VERSION,
            saved_at: Utc::now(),
            sessions,
            timeline: HashMap::new(),
            repo_notes: HashMap::new(),
        },
    )
    .expect("seed state");

    let adapter = Arc::new(MockAdapter::default());
    adapter.set_panes(vec![codex_pane("%1")]);
    let monitor = Arc::new(SessionMonitor::new(
        config.clone(),
        Arc::clone(&adapter) as Arc<dyn MuxAdapter>,
        Arc::new(NoProcesses),
        Arc::new(NullPushSender),
    ));

    monitor.restore_state().await;
    monitor.tick_once().await;
    let detail = monitor.get_detail("%1").await.expect("registered");
    assert_eq!(detail.state, StateValue::WaitingInput);
    assert_eq!(detail.state_reason, "restored");
    assert_eq!(detail.custom_title.as_deref(), Some("deploy"));

    let view = monitor
        .get_state_timeline("%1", vdemon_core::TimelineRange::Hour, 200)
        .await;
    let current = view.current.expect("current");
    assert_eq!(current.source, TimelineSource::Restore);
    assert_eq!(current.reason, "restored");

    // Second estimation uses live signals again.
    monitor.tick_once().await;
    let detail = monitor.get_detail("%1").await.expect("registered");
    assert_ne!(detail.state_reason, "restored");
}

#[tokio::test]
async fn backend_failure_skips_tick_without_state_loss() {
    let h = harness();
    h.adapter.set_panes(vec![codex_pane("%1")]);
    h.monitor.tick_once().await;

    h.adapter.set_failing(true);
    h.monitor.tick_once().await;

    // Pane survives the failed tick.
    assert!(h.monitor.get_detail("%1").await.is_some());
    assert!(h.monitor.last_backend_error().await.is_some());

    h.adapter.set_failing(false);
    h.monitor.tick_once().await;
    assert!(h.monitor.last_backend_error().await.is_none());
}

#[tokio::test]
async fn foreign_pipe_marks_conflict() {
    let h = harness();
    let mut pane = codex_pane("%1");
    pane.pane_pipe = "1".to_owned(); // someone else's pipe, no tag
    h.adapter.set_panes(vec![pane]);

    h.monitor.tick_once().await;

    let detail = h.monitor.get_detail("%1").await.expect("registered");
    assert!(!detail.pipe_attached);
    assert!(detail.pipe_conflict);
    assert!(h.adapter.attach_calls().is_empty());
}

#[tokio::test]
async fn fingerprint_change_synthesizes_output() {
    let h = harness();
    h.adapter.set_panes(vec![codex_pane("%1")]);
    h.adapter.set_capture("%1", "codex> working on it |");

    h.monitor.tick_once().await;
    // First capture is baseline only.
    let detail = h.monitor.get_detail("%1").await.expect("registered");
    assert_eq!(detail.state, StateValue::Unknown);

    h.adapter.set_capture("%1", "codex> working on it /");
    h.monitor.tick_once().await;

    let detail = h.monitor.get_detail("%1").await.expect("registered");
    assert_eq!(detail.state, StateValue::Running);
    assert_eq!(detail.state_reason, "recent_output");
}

#[tokio::test]
async fn record_input_updates_detail_and_persists() {
    let h = harness();
    h.adapter.set_panes(vec![codex_pane("%1")]);
    h.monitor.tick_once().await;

    let at = Utc::now();
    h.monitor.record_input("%1", Some(at)).await;

    let detail = h.monitor.get_detail("%1").await.expect("registered");
    assert_eq!(detail.last_input_at, Some(at));

    let document = persist::load_state(&h.config.state_path()).expect("state file");
    assert_eq!(
        document.sessions.get("%1").expect("session").last_input_at,
        Some(at)
    );
}
