//! vdemon-monitor: the vde-monitor session monitor core.
//!
//! Coordinates three asynchronous inputs — multiplexer pane listings,
//! pane-log growth, and agent hook events — into a push-subscribable
//! session registry with a bounded state timeline, rotating persistence,
//! and a notification dispatcher.

pub mod broadcast;
pub mod classify;
pub mod config;
pub mod monitor;
pub mod notify;
pub mod pane_state;
pub mod paths;
pub mod persist;
pub mod sources;

pub use broadcast::{Broadcaster, SessionEvent};
pub use classify::{Classification, PaneClassifier, ProcessEntry, ProcessInspector, PsProcessInspector};
pub use config::MonitorConfig;
pub use monitor::SessionMonitor;
pub use notify::{
    NotificationDispatcher, NotifyKind, PushError, PushSender, Subscription, SubscriptionStore,
};
pub use pane_state::{PaneState, PaneStateStore};
pub use persist::{PersistError, PersistedSession, STATE_VERSION, StateDocument};
pub use sources::{ActivityEvent, HookTailer, LogActivityPoller};
