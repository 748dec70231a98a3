//! vdemon-core: pure domain layer for the vde-monitor session monitor.
//! Types, state estimation, hook derivation, fingerprint normalization,
//! the timeline store, and the session registry. No IO, no async.

pub mod estimate;
pub mod fingerprint;
pub mod hook;
pub mod registry;
pub mod timeline;
pub mod types;

pub use estimate::{CODEX_RUNNING_CLAMP_MS, StateThresholds, estimate};
pub use fingerprint::{DEFAULT_TAIL_LINES, fingerprint, fnv1a64, normalize_tail};
pub use hook::{HookEventLine, derive_hook_state};
pub use registry::SessionRegistry;
pub use timeline::{
    DEFAULT_EVENT_CAP, DEFAULT_QUERY_LIMIT, TimelineRange, TimelineRecord, TimelineStore,
    TimelineView,
};
pub use types::{
    AgentKind, HookSignal, SessionDetail, StateValue, TimelineEvent, TimelineSource,
    source_for_reason,
};
