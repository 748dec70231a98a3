//! State persistence: atomic JSON snapshot of sessions, timeline, and
//! repo notes. Readers reject any version other than 2.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use vdemon_core::{StateValue, TimelineEvent};

pub const STATE_VERSION: u32 = 2;

/// Persisted slice of one session's pane state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_input_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_title: Option<String>,
    #[serde(default)]
    pub state: StateValue,
    #[serde(default)]
    pub state_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_observed_at: Option<DateTime<Utc>>,
}

/// On-disk document shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateDocument {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub sessions: HashMap<String, PersistedSession>,
    #[serde(default)]
    pub timeline: HashMap<String, Vec<TimelineEvent>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub repo_notes: HashMap<String, Vec<serde_json::Value>>,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state io error: {0}")]
    Io(#[from] io::Error),

    #[error("state serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unsupported state version {found} (expected {STATE_VERSION})")]
    VersionMismatch { found: u32 },
}

/// Write the snapshot atomically: unique tmp file, 0600, fsync, rename.
/// On failure the tmp file is unlinked and the previous snapshot stays.
pub fn save_state(path: &Path, document: &StateDocument) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let epoch_ms = (nanos / 1_000_000) as u64;
    let tmp_name = format!(
        "{}.tmp-{}-{}-{:04}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_owned()),
        std::process::id(),
        epoch_ms,
        nanos % 10_000
    );
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| -> Result<(), PersistError> {
        let payload = serde_json::to_vec_pretty(document)?;
        fs::write(&tmp_path, payload)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }
        let file = fs::File::open(&tmp_path)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Read and validate a snapshot. Timeline events that fail schema
/// validation are dropped; a version mismatch rejects the document.
pub fn load_state(path: &Path) -> Result<StateDocument, PersistError> {
    let raw = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;

    let version = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0) as u32;
    if version != STATE_VERSION {
        return Err(PersistError::VersionMismatch { found: version });
    }

    let saved_at = value
        .get("saved_at")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?
        .unwrap_or_else(Utc::now);

    let sessions: HashMap<String, PersistedSession> = value
        .get("sessions")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?
        .unwrap_or_default();

    let mut timeline: HashMap<String, Vec<TimelineEvent>> = HashMap::new();
    if let Some(panes) = value.get("timeline").and_then(serde_json::Value::as_object) {
        for (pane_id, events) in panes {
            let Some(events) = events.as_array() else {
                continue;
            };
            let mut kept = Vec::with_capacity(events.len());
            for event in events {
                match serde_json::from_value::<TimelineEvent>(event.clone()) {
                    Ok(parsed) => kept.push(parsed),
                    Err(e) => {
                        warn!(pane_id = %pane_id, error = %e, "dropping invalid timeline event");
                    }
                }
            }
            if !kept.is_empty() {
                timeline.insert(pane_id.clone(), kept);
            }
        }
    }

    let repo_notes: HashMap<String, Vec<serde_json::Value>> = value
        .get("repo_notes")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .unwrap_or_default()
        .unwrap_or_default();

    Ok(StateDocument {
        version,
        saved_at,
        sessions,
        timeline,
        repo_notes,
    })
}
