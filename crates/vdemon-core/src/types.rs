use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Agent ────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum AgentKind {
    Codex,
    Claude,
    #[default]
    Unknown,
}

impl AgentKind {
    pub const ALL: [Self; 3] = [Self::Codex, Self::Claude, Self::Unknown];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "codex" => Ok(Self::Codex),
            "claude" => Ok(Self::Claude),
            "unknown" => Ok(Self::Unknown),
            _ => Err(ParseEnumError {
                kind: "agent",
                value: s.to_owned(),
            }),
        }
    }
}

// ─── Session State ────────────────────────────────────────────────

/// Classified runtime state of a monitored pane.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum StateValue {
    Running,
    WaitingInput,
    WaitingPermission,
    Shell,
    #[default]
    Unknown,
}

impl StateValue {
    pub const ALL: [Self; 5] = [
        Self::Running,
        Self::WaitingInput,
        Self::WaitingPermission,
        Self::Shell,
        Self::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::WaitingInput => "WAITING_INPUT",
            Self::WaitingPermission => "WAITING_PERMISSION",
            Self::Shell => "SHELL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateValue {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "WAITING_INPUT" => Ok(Self::WaitingInput),
            "WAITING_PERMISSION" => Ok(Self::WaitingPermission),
            "SHELL" => Ok(Self::Shell),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(ParseEnumError {
                kind: "state",
                value: s.to_owned(),
            }),
        }
    }
}

// ─── Hook Signal ──────────────────────────────────────────────────

/// Deterministic state evidence derived from an agent hook event.
/// Replaced wholesale on each new hook; never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSignal {
    pub state: StateValue,
    pub reason: String,
    pub at: DateTime<Utc>,
}

// ─── Session Detail ───────────────────────────────────────────────

/// Publication record for one monitored pane. Immutable once emitted;
/// the registry replaces the whole value on change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    pub pane_id: String,
    pub session_name: String,
    pub window_index: u32,
    pub pane_index: u32,
    pub pane_active: bool,
    pub current_path: String,
    pub title: String,
    pub custom_title: Option<String>,
    pub repo_root: Option<String>,
    pub agent: AgentKind,
    pub state: StateValue,
    pub state_reason: String,
    pub last_message: Option<String>,
    pub last_output_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_input_at: Option<DateTime<Utc>>,
    pub pipe_attached: bool,
    pub pipe_conflict: bool,
    pub start_command: String,
    pub pane_pid: Option<u32>,
}

// ─── Timeline ─────────────────────────────────────────────────────

/// Which subsystem caused a state transition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineSource {
    #[default]
    Poll,
    Hook,
    Restore,
}

impl TimelineSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Hook => "hook",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for TimelineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a transition reason into its timeline source.
/// `hook:*` reasons come from the hook tailer, `restored` from snapshot
/// rehydration, everything else from the poll loop.
pub fn source_for_reason(reason: &str) -> TimelineSource {
    if reason.starts_with("hook:") {
        TimelineSource::Hook
    } else if reason == "restored" {
        TimelineSource::Restore
    } else {
        TimelineSource::Poll
    }
}

/// One state interval for a pane. `ended_at == None` marks the pane's
/// current interval; at most one current event exists per pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: u64,
    pub pane_id: String,
    pub state: StateValue,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_root: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub source: TimelineSource,
}

impl TimelineEvent {
    /// Interval duration in milliseconds; open intervals run to `now`.
    pub fn duration_ms(&self, now: DateTime<Utc>) -> i64 {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).num_milliseconds().max(0)
    }
}

// ─── Error ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

// ─── Tests ────────────────────────────────────────────────────────
