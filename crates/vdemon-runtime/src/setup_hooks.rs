//! Generate and apply the Claude Code hook configuration that feeds the
//! monitor's hook-event file.

use std::path::PathBuf;

use crate::cli::SetupHooksOpts;

/// Hook names the monitor consumes.
const HOOK_TYPES: &[&str] = &[
    "Notification",
    "Stop",
    "UserPromptSubmit",
    "PreToolUse",
    "PostToolUse",
];

/// Resolve the settings.json path based on scope.
pub fn settings_path(scope: &str) -> anyhow::Result<PathBuf> {
    match scope {
        "project" => Ok(PathBuf::from(".claude/settings.json")),
        "user" => {
            let home = std::env::var("HOME")
                .map_err(|_| anyhow::anyhow!("HOME not set; cannot resolve user scope"))?;
            Ok(PathBuf::from(home).join(".claude/settings.json"))
        }
        _ => anyhow::bail!("invalid scope: {scope:?} (expected \"project\" or \"user\")"),
    }
}

/// Shell-quote a path for safe embedding in a shell command string.
fn shell_quote(path: &str) -> String {
    if path.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == '\\') {
        format!("'{}'", path.replace('\'', "'\\''"))
    } else {
        path.to_string()
    }
}

/// Each hook pipes its stdin JSON through `jq` to stamp the event name
/// and timestamp, then appends one line to the event file.
pub fn generate_hooks_config(events_file: &str) -> serde_json::Value {
    let mut hooks = serde_json::Map::new();
    let quoted = shell_quote(events_file);

    for hook_type in HOOK_TYPES {
        let command = format!(
            "jq -c --arg name {hook_type} --arg ts \"$(date -u +%Y-%m-%dT%H:%M:%SZ)\" \
             '. + {{hook_event_name: $name, ts: $ts, tmux_pane: env.TMUX_PANE}}' >> {quoted}"
        );
        hooks.insert(
            (*hook_type).to_string(),
            serde_json::json!([{
                "hooks": [{ "type": "command", "command": command }],
            }]),
        );
    }

    serde_json::Value::Object(hooks)
}

/// Apply hook configuration to the settings file (merge, not overwrite).
pub fn apply_hooks(opts: &SetupHooksOpts, default_events_file: &str) -> anyhow::Result<PathBuf> {
    let path = settings_path(&opts.scope)?;
    let events_file = opts
        .events_file
        .as_deref()
        .unwrap_or(default_events_file);
    let hooks = generate_hooks_config(events_file);

    let mut settings: serde_json::Value = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)?
    } else {
        serde_json::json!({})
    };

    let obj = settings
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("settings.json is not a JSON object"))?;
    obj.insert("hooks".to_string(), hooks);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let output = serde_json::to_string_pretty(&settings)?;
    std::fs::write(&path, format!("{output}\n"))?;

    Ok(path)
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_hooks_config_all_types() {
        let config = generate_hooks_config("/home/u/.vde-monitor/events/k/claude.jsonl");
        let obj = config.as_object().expect("should be object");

        for hook_type in HOOK_TYPES {
            assert!(obj.contains_key(*hook_type), "missing hook type: {hook_type}");
            let cmd = obj[*hook_type][0]["hooks"][0]["command"]
                .as_str()
                .expect("command string");
            assert!(cmd.contains(hook_type));
            assert!(cmd.contains("claude.jsonl"));
            assert!(cmd.contains("tmux_pane"));
        }
    }

    #[test]
    fn settings_path_project() {
        let path = settings_path("project").expect("ok");
        assert_eq!(path, PathBuf::from(".claude/settings.json"));
    }

    #[test]
    fn settings_path_invalid_scope() {
        assert!(settings_path("invalid").is_err());
    }

    #[test]
    fn paths_with_spaces_are_quoted() {
        let config = generate_hooks_config("/path/with spaces/claude.jsonl");
        let cmd = config["Stop"][0]["hooks"][0]["command"]
            .as_str()
            .expect("cmd");
        assert!(cmd.contains("'/path/with spaces/claude.jsonl'"));
    }
}
