//! Notification dispatcher: filters registry state transitions against
//! push subscriptions and delivers with bounded retry.
//!
//! The registry observer only classifies and enqueues; a worker task
//! owns delivery so the monitor loop never blocks on the network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vdemon_core::{SessionDetail, SessionRegistry, StateValue};

/// Retry backoff schedule after the initial attempt.
const RETRY_BACKOFF_MS: [u64; 2] = [500, 1500];

// ─── Event kinds ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyKind {
    #[serde(rename = "pane.waiting_permission")]
    WaitingPermission,
    #[serde(rename = "pane.task_completed")]
    TaskCompleted,
}

impl NotifyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitingPermission => "pane.waiting_permission",
            Self::TaskCompleted => "pane.task_completed",
        }
    }
}

/// Transition table. Only departures from `Running` notify; restored
/// states and first observations never do.
pub fn classify_transition(prev: StateValue, next: &SessionDetail) -> Option<NotifyKind> {
    if next.state_reason == "restored" {
        return None;
    }
    match (prev, next.state) {
        (StateValue::Running, StateValue::WaitingPermission) => Some(NotifyKind::WaitingPermission),
        (StateValue::Running, StateValue::WaitingInput) => Some(NotifyKind::TaskCompleted),
        _ => None,
    }
}

// ─── Subscriptions ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub url: String,
    /// `None` is the wildcard: all panes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_ids: Option<Vec<String>>,
    /// `None` falls back to the store's globally enabled kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<NotifyKind>>,
    #[serde(default)]
    pub cooldown_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_delivered_at: Option<DateTime<Utc>>,
}

/// Subscription ledger plus the global event-type switch.
#[derive(Debug, Clone)]
pub struct SubscriptionStore {
    subscriptions: Vec<Subscription>,
    enabled_event_types: Vec<NotifyKind>,
}

impl Default for SubscriptionStore {
    fn default() -> Self {
        Self {
            subscriptions: Vec::new(),
            enabled_event_types: vec![NotifyKind::WaitingPermission, NotifyKind::TaskCompleted],
        }
    }
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(enabled: Vec<NotifyKind>) -> Self {
        Self {
            subscriptions: Vec::new(),
            enabled_event_types: enabled,
        }
    }

    pub fn add(&mut self, subscription: Subscription) {
        let id = subscription.id.clone();
        self.remove(&id);
        self.subscriptions.push(subscription);
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        before != self.subscriptions.len()
    }

    pub fn list(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn get(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.id == id)
    }

    pub fn mark_delivered(&mut self, id: &str, at: DateTime<Utc>) {
        if let Some(sub) = self.subscriptions.iter_mut().find(|s| s.id == id) {
            sub.last_delivered_at = Some(at);
        }
    }

    /// Subscription ids eligible for `(pane_id, kind)` at `now`:
    /// pane filter, event-type filter (falling back to the global set),
    /// and cooldown must all pass.
    pub fn eligible(&self, pane_id: &str, kind: NotifyKind, now: DateTime<Utc>) -> Vec<String> {
        self.subscriptions
            .iter()
            .filter(|sub| {
                sub.pane_ids
                    .as_ref()
                    .is_none_or(|ids| ids.iter().any(|id| id == pane_id))
            })
            .filter(|sub| {
                sub.event_types
                    .as_ref()
                    .unwrap_or(&self.enabled_event_types)
                    .contains(&kind)
            })
            .filter(|sub| match sub.last_delivered_at {
                None => true,
                Some(last) => (now - last).num_milliseconds() >= sub.cooldown_ms,
            })
            .map(|sub| sub.id.clone())
            .collect()
    }
}

// ─── Delivery ────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("push send failed: {0}")]
pub struct PushError(pub String);

/// Push transport, trait-bounded so tests inject mocks. Returns the
/// HTTP status code.
pub trait PushSender: Send + Sync {
    fn send(&self, url: &str, payload: &serde_json::Value) -> Result<u16, PushError>;
}

/// reqwest-backed sender used in production. The blocking client is
/// built lazily on the first send, which always runs on a blocking
/// thread, never inside the async runtime.
#[derive(Default)]
pub struct HttpPushSender {
    client: std::sync::OnceLock<reqwest::blocking::Client>,
}

impl HttpPushSender {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, PushError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| PushError(e.to_string()))?;
        Ok(self.client.get_or_init(|| built))
    }
}

impl PushSender for HttpPushSender {
    fn send(&self, url: &str, payload: &serde_json::Value) -> Result<u16, PushError> {
        let response = self
            .client()?
            .post(url)
            .json(payload)
            .send()
            .map_err(|e| PushError(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// One queued push.
#[derive(Debug, Clone)]
pub struct PushJob {
    pub subscription_id: String,
    pub url: String,
    pub payload: serde_json::Value,
}

/// Deliver one job: initial attempt plus up to two retries (500 ms,
/// 1500 ms). Token errors and `410 Gone` drop the subscription; other
/// 4xx are final; 5xx and network errors retry.
pub async fn deliver(
    job: PushJob,
    store: &Arc<Mutex<SubscriptionStore>>,
    sender: &Arc<dyn PushSender>,
) {
    for attempt in 0..=RETRY_BACKOFF_MS.len() {
        if attempt > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(
                RETRY_BACKOFF_MS[attempt - 1],
            ))
            .await;
        }

        let send_sender = Arc::clone(sender);
        let url = job.url.clone();
        let payload = job.payload.clone();
        let result =
            tokio::task::spawn_blocking(move || send_sender.send(&url, &payload)).await;

        let status = match result {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                debug!(subscription = %job.subscription_id, error = %e, "push attempt failed");
                continue;
            }
            Err(e) => {
                warn!(subscription = %job.subscription_id, error = %e, "push task failed");
                continue;
            }
        };

        match status {
            200..=299 => {
                store
                    .lock()
                    .expect("subscription store lock")
                    .mark_delivered(&job.subscription_id, Utc::now());
                return;
            }
            410 => {
                info!(subscription = %job.subscription_id, "subscription gone, removing");
                store
                    .lock()
                    .expect("subscription store lock")
                    .remove(&job.subscription_id);
                return;
            }
            401 | 403 => {
                warn!(subscription = %job.subscription_id, status, "push token invalid, removing");
                store
                    .lock()
                    .expect("subscription store lock")
                    .remove(&job.subscription_id);
                return;
            }
            400..=499 => {
                debug!(subscription = %job.subscription_id, status, "push rejected, not retried");
                return;
            }
            _ => {
                debug!(subscription = %job.subscription_id, status, "push server error, will retry");
            }
        }
    }
}

// ─── Dispatcher ──────────────────────────────────────────────────

/// Registry change observer plus the delivery queue.
pub struct NotificationDispatcher {
    store: Arc<Mutex<SubscriptionStore>>,
    prev_states: Arc<Mutex<HashMap<String, StateValue>>>,
    tx: mpsc::UnboundedSender<PushJob>,
    rx: Option<mpsc::UnboundedReceiver<PushJob>>,
}

impl NotificationDispatcher {
    pub fn new(store: SubscriptionStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store: Arc::new(Mutex::new(store)),
            prev_states: Arc::new(Mutex::new(HashMap::new())),
            tx,
            rx: Some(rx),
        }
    }

    pub fn store(&self) -> Arc<Mutex<SubscriptionStore>> {
        Arc::clone(&self.store)
    }

    /// Register the transition observer into the registry.
    pub fn attach(&self, registry: &mut SessionRegistry) {
        let store = Arc::clone(&self.store);
        let prev_states = Arc::clone(&self.prev_states);
        let tx = self.tx.clone();

        registry.on_changed(move |detail| {
            let prev = prev_states
                .lock()
                .expect("prev-state lock")
                .insert(detail.pane_id.clone(), detail.state);
            let Some(prev) = prev else {
                return;
            };
            let Some(kind) = classify_transition(prev, detail) else {
                return;
            };

            let now = Utc::now();
            let eligible = store
                .lock()
                .expect("subscription store lock")
                .eligible(&detail.pane_id, kind, now);
            for subscription_id in eligible {
                let url = {
                    let store = store.lock().expect("subscription store lock");
                    match store.get(&subscription_id) {
                        Some(sub) => sub.url.clone(),
                        None => continue,
                    }
                };
                let _ = tx.send(PushJob {
                    subscription_id,
                    url,
                    payload: payload_for(kind, detail, now),
                });
            }
        });

        let prev_states = Arc::clone(&self.prev_states);
        registry.on_removed(move |pane_id| {
            prev_states.lock().expect("prev-state lock").remove(pane_id);
        });
    }

    /// Spawn the delivery worker. Call once; subsequent calls are no-ops.
    pub fn spawn_worker(
        &mut self,
        tracker: &tokio_util::task::TaskTracker,
        cancel: CancellationToken,
        sender: Arc<dyn PushSender>,
    ) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        let store = Arc::clone(&self.store);
        tracker.spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    job = rx.recv() => {
                        let Some(job) = job else { break };
                        deliver(job, &store, &sender).await;
                    }
                }
            }
        });
    }
}

fn payload_for(kind: NotifyKind, detail: &SessionDetail, now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "type": kind.as_str(),
        "pane_id": detail.pane_id,
        "session_name": detail.session_name,
        "title": detail.custom_title.as_deref().unwrap_or(&detail.title),
        "state": detail.state,
        "reason": detail.state_reason,
        "at": now,
    })
}

// ─── Tests ───────────────────────────────────────────────────────
