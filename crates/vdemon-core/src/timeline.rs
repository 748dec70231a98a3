//! Bounded per-pane state timeline.
//!
//! Pure state machine: all time values are passed in as parameters, so the
//! store has no clock access and replays deterministically. Range queries
//! return a bounded materialized slice, not a stream.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{StateValue, TimelineEvent, TimelineSource};

/// Per-pane event cap; oldest non-current events are dropped beyond it.
pub const DEFAULT_EVENT_CAP: usize = 500;

/// Default `get_timeline` item limit.
pub const DEFAULT_QUERY_LIMIT: usize = 200;

// ─── Range ────────────────────────────────────────────────────────

/// Query window for timeline reads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimelineRange {
    #[serde(rename = "1h")]
    Hour,
    #[default]
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
}

impl TimelineRange {
    pub const ALL: [Self; 4] = [Self::Hour, Self::SixHours, Self::Day, Self::Week];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "1h",
            Self::SixHours => "6h",
            Self::Day => "24h",
            Self::Week => "7d",
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::SixHours => Duration::hours(6),
            Self::Day => Duration::hours(24),
            Self::Week => Duration::days(7),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1h" => Some(Self::Hour),
            "6h" => Some(Self::SixHours),
            "24h" => Some(Self::Day),
            "7d" => Some(Self::Week),
            _ => None,
        }
    }
}

// ─── Record input ─────────────────────────────────────────────────

/// Arguments for [`TimelineStore::record`].
#[derive(Debug, Clone)]
pub struct TimelineRecord {
    pub pane_id: String,
    pub state: StateValue,
    pub reason: String,
    /// Transition time; `None` means the caller's `now`.
    pub at: Option<DateTime<Utc>>,
    pub source: TimelineSource,
    pub repo_root: Option<String>,
}

// ─── View ─────────────────────────────────────────────────────────

/// Materialized result of a range query. Items are clipped to the range
/// and capped at `limit`; totals cover every in-range event regardless of
/// the item limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineView {
    pub items: Vec<TimelineEvent>,
    pub current: Option<TimelineEvent>,
    pub totals_ms: HashMap<StateValue, i64>,
    pub range: TimelineRange,
    pub now: DateTime<Utc>,
}

// ─── Store ────────────────────────────────────────────────────────

/// Ordered per-pane list of state intervals with at most one open
/// interval per pane.
#[derive(Debug, Clone)]
pub struct TimelineStore {
    events: HashMap<String, Vec<TimelineEvent>>,
    next_id: u64,
    cap: usize,
}

impl Default for TimelineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_EVENT_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            events: HashMap::new(),
            next_id: 1,
            cap: cap.max(1),
        }
    }

    /// Record a `(state, reason)` observation for a pane.
    ///
    /// A matching current interval makes this a no-op. Otherwise the
    /// current interval (if any) is closed at the transition time and a
    /// new open interval is appended. Returns `true` when a new interval
    /// was opened.
    pub fn record(&mut self, rec: TimelineRecord, now: DateTime<Utc>) -> bool {
        let at = rec.at.unwrap_or(now);
        let list = self.events.entry(rec.pane_id.clone()).or_default();

        if let Some(current) = list.iter_mut().rev().find(|e| e.ended_at.is_none()) {
            if current.state == rec.state && current.reason == rec.reason {
                return false;
            }
            current.ended_at = Some(at);
        }

        let id = self.next_id;
        self.next_id += 1;
        list.push(TimelineEvent {
            id,
            pane_id: rec.pane_id,
            state: rec.state,
            reason: rec.reason,
            repo_root: rec.repo_root,
            started_at: at,
            ended_at: None,
            source: rec.source,
        });

        if list.len() > self.cap {
            // Drop oldest closed events first; the open interval survives.
            let excess = list.len() - self.cap;
            let mut dropped = 0;
            list.retain(|e| {
                if dropped < excess && e.ended_at.is_some() {
                    dropped += 1;
                    false
                } else {
                    true
                }
            });
        }

        true
    }

    /// Close the pane's current interval. Subsequent records open a new
    /// one. Returns `true` if an open interval was closed.
    pub fn close_pane(
        &mut self,
        pane_id: &str,
        at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(list) = self.events.get_mut(pane_id) else {
            return false;
        };
        let Some(current) = list.iter_mut().rev().find(|e| e.ended_at.is_none()) else {
            return false;
        };
        current.ended_at = Some(at.unwrap_or(now));
        true
    }

    /// The pane's open interval, if any.
    pub fn current(&self, pane_id: &str) -> Option<&TimelineEvent> {
        self.events
            .get(pane_id)?
            .iter()
            .rev()
            .find(|e| e.ended_at.is_none())
    }

    /// Whether any events (open or closed) exist for a pane.
    pub fn has_events(&self, pane_id: &str) -> bool {
        self.events.get(pane_id).is_some_and(|l| !l.is_empty())
    }

    /// Range query. Events overlapping the window are clipped to it;
    /// `limit` bounds the returned items (newest kept), totals always
    /// cover the full window.
    pub fn get_timeline(
        &self,
        pane_id: &str,
        range: TimelineRange,
        limit: usize,
        now: DateTime<Utc>,
    ) -> TimelineView {
        let range_start = now - range.duration();
        let mut totals_ms: HashMap<StateValue, i64> = HashMap::new();
        let mut items: Vec<TimelineEvent> = Vec::new();

        if let Some(list) = self.events.get(pane_id) {
            for event in list {
                let end = event.ended_at.unwrap_or(now).min(now);
                if end <= range_start || event.started_at >= now {
                    continue;
                }
                let clipped_start = event.started_at.max(range_start);
                let duration = (end - clipped_start).num_milliseconds().max(0);
                *totals_ms.entry(event.state).or_insert(0) += duration;

                let mut clipped = event.clone();
                clipped.started_at = clipped_start;
                items.push(clipped);
            }
        }

        if limit == 0 {
            items.clear();
        } else if items.len() > limit {
            items.drain(..items.len() - limit);
        }

        TimelineView {
            items,
            current: self.current(pane_id).cloned(),
            totals_ms,
            range,
            now,
        }
    }

    /// All events, keyed by pane, for persistence.
    pub fn snapshot(&self) -> HashMap<String, Vec<TimelineEvent>> {
        self.events.clone()
    }

    /// Rehydrate from a persisted snapshot without firing any observers.
    /// Event ids continue past the restored maximum.
    pub fn restore(&mut self, events: HashMap<String, Vec<TimelineEvent>>) {
        let max_id = events
            .values()
            .flatten()
            .map(|e| e.id)
            .max()
            .unwrap_or(0);
        self.next_id = self.next_id.max(max_id + 1);
        self.events = events;
    }

    pub fn pane_ids(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }
}

// ─── Tests ────────────────────────────────────────────────────────
