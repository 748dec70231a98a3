//! The session monitor: a single-writer loop over three asynchronous
//! inputs (pane listings, log growth, hook events) producing the
//! registry, the timeline, and persisted state.
//!
//! All registry/timeline/pane-state mutation happens under one mutex,
//! driven by the tick. Hook events arriving between ticks only touch
//! pane-state fields; they are folded into details on the next tick.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use vdemon_core::{
    AgentKind, HookEventLine, SessionDetail, SessionRegistry, StateValue, TimelineRange,
    TimelineRecord, TimelineStore, TimelineView, derive_hook_state, estimate, source_for_reason,
};
use vdemon_mux::{AttachOutcome, MuxAdapter, MuxError, PaneInfo};

use crate::broadcast::{Broadcaster, SessionEvent};
use crate::classify::{Classification, PaneClassifier, ProcessInspector, PsProcessInspector};
use crate::config::MonitorConfig;
use crate::notify::{HttpPushSender, NotificationDispatcher, PushSender, SubscriptionStore};
use crate::pane_state::PaneStateStore;
use crate::paths;
use crate::persist::{self, PersistError, PersistedSession, StateDocument};
use crate::sources::{HookTailer, LogActivityPoller, fingerprint as fingerprint_src};

/// Grace period for in-flight work on `stop`.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ─── Tick observation ────────────────────────────────────────────

/// Blocking-phase result for one accepted pane.
#[derive(Debug)]
struct ObservedPane {
    info: PaneInfo,
    agent: AgentKind,
    attach: AttachOutcome,
    capture: Option<String>,
    log_path: PathBuf,
    repo_root: Option<String>,
}

#[derive(Debug)]
struct TickObservation {
    panes: Vec<ObservedPane>,
    all_panes: Vec<PaneInfo>,
}

// ─── Inner state ─────────────────────────────────────────────────

struct MonitorInner {
    registry: SessionRegistry,
    timeline: TimelineStore,
    pane_states: PaneStateStore,
    custom_titles: HashMap<String, String>,
    repo_notes: HashMap<String, Vec<serde_json::Value>>,
    poller: LogActivityPoller,
    last_panes: Vec<PaneInfo>,
    /// Panes whose first estimation after restart reports the restored
    /// state; drained one pane at a time.
    pending_restore: HashMap<String, StateValue>,
    last_backend_error: Option<String>,
}

struct RunHandle {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

// ─── Monitor ─────────────────────────────────────────────────────

pub struct SessionMonitor {
    config: MonitorConfig,
    adapter: Arc<dyn MuxAdapter>,
    classifier: Arc<std::sync::Mutex<PaneClassifier>>,
    inner: Arc<Mutex<MonitorInner>>,
    broadcaster: Broadcaster,
    dispatcher: std::sync::Mutex<NotificationDispatcher>,
    push_sender: Arc<dyn PushSender>,
    tailer: Arc<std::sync::Mutex<HookTailer>>,
    run: Mutex<Option<RunHandle>>,
}

impl SessionMonitor {
    pub fn new(
        config: MonitorConfig,
        adapter: Arc<dyn MuxAdapter>,
        inspector: Arc<dyn ProcessInspector>,
        push_sender: Arc<dyn PushSender>,
    ) -> Self {
        let mut registry = SessionRegistry::new();

        let broadcaster = Broadcaster::default();
        broadcaster.attach(&mut registry);

        let dispatcher = NotificationDispatcher::new(SubscriptionStore::new());
        dispatcher.attach(&mut registry);

        let tailer = HookTailer::new(config.hook_events_path());

        Self {
            adapter,
            classifier: Arc::new(std::sync::Mutex::new(PaneClassifier::new(inspector))),
            inner: Arc::new(Mutex::new(MonitorInner {
                registry,
                timeline: TimelineStore::new(),
                pane_states: PaneStateStore::new(),
                custom_titles: HashMap::new(),
                repo_notes: HashMap::new(),
                poller: LogActivityPoller::new(),
                last_panes: Vec::new(),
                pending_restore: HashMap::new(),
                last_backend_error: None,
            })),
            broadcaster,
            dispatcher: std::sync::Mutex::new(dispatcher),
            push_sender,
            tailer: Arc::new(std::sync::Mutex::new(tailer)),
            run: Mutex::new(None),
            config,
        }
    }

    /// Production wiring: `ps` process probe and reqwest push sender.
    pub fn with_system_probes(config: MonitorConfig, adapter: Arc<dyn MuxAdapter>) -> Self {
        Self::new(
            config,
            adapter,
            Arc::new(PsProcessInspector),
            Arc::new(HttpPushSender::new()),
        )
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Restore persisted state, then launch the three periodic tasks.
    /// Idempotent while running.
    pub async fn start(self: Arc<Self>) {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return;
        }

        self.restore_state().await;

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        self.dispatcher
            .lock()
            .expect("dispatcher lock")
            .spawn_worker(&tracker, cancel.clone(), Arc::clone(&self.push_sender));

        // Monitor loop.
        {
            let monitor = Arc::clone(&self);
            let cancel = cancel.clone();
            let period = Duration::from_millis(self.config.poll_interval_ms.max(50));
            tracker.spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                    monitor.tick_once().await;
                }
            });
        }

        // Log activity poller.
        {
            let monitor = Arc::clone(&self);
            let cancel = cancel.clone();
            let period = Duration::from_millis(self.config.poll_interval_ms.max(50));
            tracker.spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                    monitor.poll_logs_once().await;
                }
            });
        }

        // Hook tailer.
        {
            let monitor = Arc::clone(&self);
            let cancel = cancel.clone();
            let period = Duration::from_millis(self.config.poll_interval_ms.max(50));
            tracker.spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                    monitor.drain_hook_events().await;
                }
            });
        }

        tracker.close();
        *run = Some(RunHandle { cancel, tracker });
        info!(server_key = %self.config.server_key(), "session monitor started");
    }

    /// Stop all tickers, wait for in-flight ticks up to the grace
    /// period, and return. A cancelled tick never writes partial state.
    pub async fn stop(&self) {
        let handle = self.run.lock().await.take();
        let Some(handle) = handle else {
            return;
        };
        handle.cancel.cancel();
        if timeout(SHUTDOWN_GRACE, handle.tracker.wait()).await.is_err() {
            warn!("shutdown grace period elapsed with tasks still running");
        }
        info!("session monitor stopped");
    }

    /// Load the persisted snapshot. Called once by `start`; the first
    /// estimation for each restored pane reports `(state, "restored")`.
    pub async fn restore_state(&self) {
        let state_path = self.config.state_path();
        let document = match persist::load_state(&state_path) {
            Ok(doc) => doc,
            Err(PersistError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(error = %e, "state restore failed, starting fresh");
                return;
            }
        };

        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        inner.timeline.restore(document.timeline);
        inner.repo_notes = document.repo_notes;

        for (pane_id, session) in document.sessions {
            {
                let state = inner.pane_states.ensure(&pane_id);
                state.last_output_at = session.last_output_at;
                state.last_event_at = session.last_event_at;
                state.last_input_at = session.last_input_at;
                state.last_message = session.last_message.clone();
                state.agent_session_id = session.agent_session_id.clone();
                state.agent_session_source = session.agent_session_source.clone();
                state.agent_session_confidence = session.agent_session_confidence;
                state.agent_session_observed_at = session.agent_session_observed_at;
            }
            if let Some(title) = session.custom_title.clone() {
                inner.custom_titles.insert(pane_id.clone(), title);
            }
            // Synthetic interval only when nothing was persisted for the pane.
            if !inner.timeline.has_events(&pane_id) {
                inner.timeline.record(
                    TimelineRecord {
                        pane_id: pane_id.clone(),
                        state: session.state,
                        reason: "restored".to_owned(),
                        at: Some(now),
                        source: vdemon_core::TimelineSource::Restore,
                        repo_root: None,
                    },
                    now,
                );
            }
            inner.pending_restore.insert(pane_id, session.state);
        }
        info!(sessions = inner.pending_restore.len(), "restored persisted state");
    }

    // ── Periodic task bodies ────────────────────────────────────
    // Public so the runtime loop and scenario tests drive the same code.

    /// One monitor-loop tick: list, classify, attach, fingerprint,
    /// fold activity, estimate, publish, prune, persist.
    pub async fn tick_once(&self) {
        let adapter = Arc::clone(&self.adapter);
        let classifier = Arc::clone(&self.classifier);
        let config = self.config.clone();

        let tick_budget =
            Duration::from_millis(self.config.adapter_timeout_ms + self.config.capture_timeout_ms);
        let observed = timeout(
            tick_budget,
            tokio::task::spawn_blocking(move || observe_panes(&*adapter, &classifier, &config)),
        )
        .await;

        let observation = match observed {
            Ok(Ok(Ok(observation))) => observation,
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "pane listing failed, skipping tick");
                self.inner.lock().await.last_backend_error = Some(e.to_string());
                return;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "tick task failed");
                return;
            }
            Err(_) => {
                warn!("adapter calls timed out, skipping tick");
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        self.apply_observation(&mut inner, observation, Utc::now());
    }

    /// One log-poller tick.
    pub async fn poll_logs_once(&self) {
        let now = Utc::now();
        self.inner.lock().await.poller.poll_once(now);
    }

    /// One hook-tailer tick: read new JSONL lines and fold the derived
    /// signals into pane state. Lines that fail parsing are dropped.
    pub async fn drain_hook_events(&self) {
        let lines = self.tailer.lock().expect("tailer lock").poll_once();
        if lines.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().await;
        for line in lines {
            match serde_json::from_str::<HookEventLine>(&line) {
                Ok(event) => apply_hook_event(&mut inner, &event),
                Err(e) => debug!(error = %e, "dropping unparseable hook line"),
            }
        }
    }

    fn apply_observation(
        &self,
        inner: &mut MonitorInner,
        observation: TickObservation,
        now: DateTime<Utc>,
    ) {
        inner.last_panes = observation.all_panes;
        inner.last_backend_error = None;

        let mut active: HashSet<String> = HashSet::with_capacity(observation.panes.len());

        for pane in &observation.panes {
            let pane_id = pane.info.pane_id.clone();
            active.insert(pane_id.clone());
            inner.poller.register(&pane_id, pane.log_path.clone());

            // Fingerprint: the first capture only establishes a baseline;
            // later differences synthesize output.
            if let Some(raw) = &pane.capture {
                let previous = inner
                    .pane_states
                    .get(&pane_id)
                    .and_then(|s| s.fingerprint.clone());
                if let Some(next) = fingerprint_src::sample(
                    previous.as_deref(),
                    raw,
                    self.config.fingerprint_lines,
                ) {
                    inner.pane_states.ensure(&pane_id).fingerprint = Some(next);
                    if previous.is_some() {
                        inner.pane_states.record_output(&pane_id, now);
                    }
                }
            }
        }

        // Fold activity events observed since the previous tick.
        for event in inner.poller.take_events() {
            inner.pane_states.record_output(&event.pane_id, event.at);
        }

        for pane in &observation.panes {
            let pane_id = pane.info.pane_id.clone();
            inner.pane_states.clear_stale_hook_signal(&pane_id);

            let (state, reason) = match inner.pending_restore.remove(&pane_id) {
                Some(restored_state) => (restored_state, "restored".to_owned()),
                None => {
                    let pane_state = inner.pane_states.get(&pane_id);
                    estimate(
                        pane.agent,
                        pane.info.pane_dead,
                        pane_state.and_then(|s| s.last_output_at),
                        pane_state.and_then(|s| s.hook_signal.as_ref()),
                        self.config.thresholds,
                        now,
                    )
                }
            };

            // Timeline record happens-before the registry update.
            inner.timeline.record(
                TimelineRecord {
                    pane_id: pane_id.clone(),
                    state,
                    reason: reason.clone(),
                    at: Some(now),
                    source: source_for_reason(&reason),
                    repo_root: pane.repo_root.clone(),
                },
                now,
            );

            let detail = build_detail(inner, pane, state, &reason);
            inner.registry.update(detail);
        }

        // Panes missing from this listing leave the registry.
        let removed = inner.registry.remove_missing(&active);
        for pane_id in &removed {
            inner.timeline.close_pane(pane_id, Some(now), now);
            inner.pane_states.remove(pane_id);
            inner.custom_titles.remove(pane_id);
            inner.poller.unregister(pane_id);
            debug!(pane_id = %pane_id, "pane removed from registry");
        }

        self.save_locked(inner, now);
    }

    fn save_locked(&self, inner: &MonitorInner, now: DateTime<Utc>) {
        let mut sessions = HashMap::new();
        for detail in inner.registry.values() {
            let pane_state = inner.pane_states.get(&detail.pane_id);
            sessions.insert(
                detail.pane_id.clone(),
                PersistedSession {
                    last_output_at: detail.last_output_at,
                    last_event_at: detail.last_event_at,
                    last_input_at: detail.last_input_at,
                    last_message: detail.last_message.clone(),
                    custom_title: detail.custom_title.clone(),
                    state: detail.state,
                    state_reason: detail.state_reason.clone(),
                    agent_session_id: pane_state.and_then(|s| s.agent_session_id.clone()),
                    agent_session_source: pane_state.and_then(|s| s.agent_session_source.clone()),
                    agent_session_confidence: pane_state.and_then(|s| s.agent_session_confidence),
                    agent_session_observed_at: pane_state
                        .and_then(|s| s.agent_session_observed_at),
                },
            );
        }

        let document = StateDocument {
            version: persist::STATE_VERSION,
            saved_at: now,
            sessions,
            timeline: inner.timeline.snapshot(),
            repo_notes: inner.repo_notes.clone(),
        };
        if let Err(e) = persist::save_state(&self.config.state_path(), &document) {
            warn!(error = %e, "state snapshot failed; previous snapshot retained");
        }
    }

    // ── Facade for the transport layer ──────────────────────────

    pub async fn snapshot(&self) -> Vec<SessionDetail> {
        self.inner.lock().await.registry.snapshot()
    }

    pub async fn get_detail(&self, pane_id: &str) -> Option<SessionDetail> {
        self.inner.lock().await.registry.get_detail(pane_id).cloned()
    }

    pub async fn get_state_timeline(
        &self,
        pane_id: &str,
        range: TimelineRange,
        limit: usize,
    ) -> TimelineView {
        self.inner
            .lock()
            .await
            .timeline
            .get_timeline(pane_id, range, limit, Utc::now())
    }

    /// Record user input for a pane, then persist.
    pub async fn record_input(&self, pane_id: &str, at: Option<DateTime<Utc>>) {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        inner.pane_states.record_input(pane_id, at.unwrap_or(now));
        if let Some(mut detail) = inner.registry.get_detail(pane_id).cloned() {
            detail.last_input_at = Some(at.unwrap_or(now));
            inner.registry.update(detail);
        }
        self.save_locked(&inner, now);
    }

    /// Set or clear a pane's custom title, then persist.
    pub async fn set_custom_title(&self, pane_id: &str, title: Option<String>) {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        match &title {
            Some(t) => {
                inner.custom_titles.insert(pane_id.to_owned(), t.clone());
            }
            None => {
                inner.custom_titles.remove(pane_id);
            }
        }
        if let Some(mut detail) = inner.registry.get_detail(pane_id).cloned() {
            detail.custom_title = title;
            inner.registry.update(detail);
        }
        self.save_locked(&inner, now);
    }

    /// Hook event delivered by the transport rather than the tailer.
    pub async fn handle_hook_event(&self, event: HookEventLine) {
        let mut inner = self.inner.lock().await;
        apply_hook_event(&mut inner, &event);
    }

    /// Raw pane tail for the screen-capture endpoint; `None` maps to a
    /// capture failure at the transport boundary.
    pub async fn get_screen_capture(&self, pane_id: &str, use_alt: bool) -> Option<String> {
        let adapter = Arc::clone(&self.adapter);
        let pane_id = pane_id.to_owned();
        let capture = timeout(
            Duration::from_millis(self.config.capture_timeout_ms),
            tokio::task::spawn_blocking(move || adapter.capture_tail(&pane_id, use_alt)),
        )
        .await;
        match capture {
            Ok(Ok(raw)) => raw,
            _ => None,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.broadcaster.subscribe()
    }

    /// Subscription store handle for the transport's push-subscription
    /// endpoints.
    pub fn subscriptions(&self) -> Arc<std::sync::Mutex<SubscriptionStore>> {
        self.dispatcher.lock().expect("dispatcher lock").store()
    }

    pub async fn last_backend_error(&self) -> Option<String> {
        self.inner.lock().await.last_backend_error.clone()
    }

    /// Forward text to a pane. Rate limiting, if any, is the caller's.
    pub fn send_text(&self, pane_id: &str, text: &str, press_enter: bool) -> vdemon_mux::SendOutcome {
        self.adapter.send_text(pane_id, text, press_enter)
    }

    pub fn send_keys(&self, pane_id: &str, keys: &[String]) -> vdemon_mux::SendOutcome {
        self.adapter.send_keys(pane_id, keys)
    }

    pub fn send_raw(
        &self,
        pane_id: &str,
        items: &[vdemon_mux::RawItem],
        allow_unsafe: bool,
    ) -> vdemon_mux::SendOutcome {
        self.adapter.send_raw(pane_id, items, allow_unsafe)
    }
}

// ─── Tick helpers ────────────────────────────────────────────────

/// Blocking phase: every subprocess and filesystem touch of a tick.
fn observe_panes(
    adapter: &dyn MuxAdapter,
    classifier: &std::sync::Mutex<PaneClassifier>,
    config: &MonitorConfig,
) -> Result<TickObservation, MuxError> {
    let all_panes = adapter.list_panes()?;
    let epoch_ms = Utc::now().timestamp_millis();

    let mut panes = Vec::new();
    for pane in &all_panes {
        let classification = classifier.lock().expect("classifier lock").classify(pane);
        let agent = match classification {
            Classification::Agent(agent) => agent,
            Classification::Ignored | Classification::Unknown => continue,
        };

        let log_path = config.pane_log_path(&pane.pane_id);
        if let Err(e) = paths::ensure_file(&log_path) {
            warn!(pane_id = %pane.pane_id, error = %e, "failed to create pane log");
        }

        let attach = match adapter.attach_pipe(&pane.pane_id, &log_path, pane) {
            Ok(outcome) => outcome,
            Err(e) => {
                // Non-fatal: the pane stays monitored without a pipe.
                warn!(pane_id = %pane.pane_id, error = %e, "pipe attach failed");
                AttachOutcome {
                    attached: false,
                    conflict: adapter.has_conflict(pane),
                }
            }
        };

        if let Err(e) = paths::rotate_if_oversized(
            &log_path,
            config.max_pane_log_bytes,
            config.retain_rotations,
            epoch_ms,
        ) {
            debug!(pane_id = %pane.pane_id, error = %e, "pane log rotation failed");
        }

        let capture = if pane.pane_dead {
            None
        } else {
            adapter.capture_tail(&pane.pane_id, pane.alternate_on)
        };

        panes.push(ObservedPane {
            agent,
            attach,
            capture,
            log_path,
            repo_root: find_repo_root(&pane.current_path),
            info: pane.clone(),
        });
    }

    // The hook-event log is shared append-only; rotate it here too.
    if let Err(e) = paths::rotate_if_oversized(
        &config.hook_events_path(),
        config.max_event_log_bytes,
        config.retain_rotations,
        epoch_ms,
    ) {
        debug!(error = %e, "hook-event log rotation failed");
    }

    Ok(TickObservation { panes, all_panes })
}

/// Nearest ancestor of `path` containing `.git`.
fn find_repo_root(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let mut current = Some(Path::new(path));
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            return Some(dir.to_string_lossy().into_owned());
        }
        current = dir.parent();
    }
    None
}

fn build_detail(
    inner: &MonitorInner,
    pane: &ObservedPane,
    state: StateValue,
    reason: &str,
) -> SessionDetail {
    let pane_id = &pane.info.pane_id;
    let pane_state = inner.pane_states.get(pane_id);
    SessionDetail {
        pane_id: pane_id.clone(),
        session_name: pane.info.session_name.clone(),
        window_index: pane.info.window_index,
        pane_index: pane.info.pane_index,
        pane_active: pane.info.pane_active,
        current_path: pane.info.current_path.clone(),
        title: pane.info.pane_title.clone(),
        custom_title: inner.custom_titles.get(pane_id).cloned(),
        repo_root: pane.repo_root.clone(),
        agent: pane.agent,
        state,
        state_reason: reason.to_owned(),
        last_message: pane_state.and_then(|s| s.last_message.clone()),
        last_output_at: pane_state.and_then(|s| s.last_output_at),
        last_event_at: pane_state.and_then(|s| s.last_event_at),
        last_input_at: pane_state.and_then(|s| s.last_input_at),
        pipe_attached: pane.attach.attached,
        pipe_conflict: pane.attach.conflict,
        start_command: pane.info.pane_start_command.clone(),
        pane_pid: pane.info.pane_pid,
    }
}

/// Fold one hook event into pane state. Hook → pane mapping prefers the
/// explicit pane id, then a unique tty match, then a unique cwd match;
/// anything else is dropped.
fn apply_hook_event(inner: &mut MonitorInner, event: &HookEventLine) {
    let Some(signal) = derive_hook_state(event) else {
        return;
    };
    let Some(pane_id) = map_hook_to_pane(&inner.last_panes, event) else {
        debug!(hook = %event.hook_event_name, "hook event matched no pane, dropped");
        return;
    };
    inner.pane_states.set_hook_signal(&pane_id, signal);
}

fn map_hook_to_pane(panes: &[PaneInfo], event: &HookEventLine) -> Option<String> {
    if let Some(pane_id) = &event.tmux_pane {
        return Some(pane_id.clone());
    }
    if let Some(tty) = &event.tty {
        let mut matches = panes.iter().filter(|p| &p.pane_tty == tty);
        if let (Some(only), None) = (matches.next(), matches.next()) {
            return Some(only.pane_id.clone());
        }
    }
    if let Some(cwd) = &event.cwd {
        let mut matches = panes.iter().filter(|p| &p.current_path == cwd);
        if let (Some(only), None) = (matches.next(), matches.next()) {
            return Some(only.pane_id.clone());
        }
    }
    None
}

// ─── Tests ───────────────────────────────────────────────────────
