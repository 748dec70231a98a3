//! UDS transport adapter: newline-delimited JSON requests over the
//! monitor facade. Connection-per-request; the real HTTP/WS router is a
//! separate client of this same facade.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use vdemon_core::{HookEventLine, TimelineRange};
use vdemon_monitor::{SessionMonitor, Subscription};
use vdemon_mux::RawItem;

/// Run the UDS server until the task is cancelled.
pub async fn run_server(socket_path: &str, monitor: Arc<SessionMonitor>) -> anyhow::Result<()> {
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Refuse to run beside a live daemon; clean up after a dead one.
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, monitor).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    monitor: Arc<SessionMonitor>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = serde_json::from_str(line.trim())?;
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();
    let params = request["params"].clone();

    let result = dispatch(method, &params, &monitor).await;

    let response = match result {
        Some(result) => serde_json::json!({ "result": result, "id": id }),
        None => serde_json::json!({
            "error": { "code": "METHOD_NOT_FOUND", "message": format!("unknown method {method:?}") },
            "id": id,
        }),
    };
    let mut payload = serde_json::to_string(&response)?;
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;
    Ok(())
}

async fn dispatch(
    method: &str,
    params: &serde_json::Value,
    monitor: &Arc<SessionMonitor>,
) -> Option<serde_json::Value> {
    let result = match method {
        "list_sessions" => serde_json::json!(monitor.snapshot().await),
        "get_detail" => {
            let pane_id = params["pane_id"].as_str().unwrap_or("");
            serde_json::json!(monitor.get_detail(pane_id).await)
        }
        "get_timeline" => {
            let pane_id = params["pane_id"].as_str().unwrap_or("");
            let range = params["range"]
                .as_str()
                .and_then(TimelineRange::parse)
                .unwrap_or_default();
            let limit = params["limit"]
                .as_u64()
                .map(|l| l as usize)
                .unwrap_or(vdemon_core::DEFAULT_QUERY_LIMIT);
            serde_json::json!(monitor.get_state_timeline(pane_id, range, limit).await)
        }
        "record_input" => {
            let pane_id = params["pane_id"].as_str().unwrap_or("");
            let at = params["at"]
                .as_str()
                .and_then(|s| s.parse::<chrono::DateTime<chrono::Utc>>().ok());
            monitor.record_input(pane_id, at).await;
            serde_json::json!({ "ok": true })
        }
        "set_title" => {
            let pane_id = params["pane_id"].as_str().unwrap_or("");
            let title = params["title"].as_str().map(String::from);
            monitor.set_custom_title(pane_id, title).await;
            serde_json::json!({ "ok": true })
        }
        "hook_event" => match serde_json::from_value::<HookEventLine>(params.clone()) {
            Ok(event) => {
                monitor.handle_hook_event(event).await;
                serde_json::json!({ "ok": true })
            }
            Err(e) => serde_json::json!({
                "ok": false,
                "error": { "code": "BAD_REQUEST", "message": e.to_string() },
            }),
        },
        "send_text" => {
            let monitor = Arc::clone(monitor);
            let pane_id = params["pane_id"].as_str().unwrap_or("").to_owned();
            let text = params["text"].as_str().unwrap_or("").to_owned();
            let enter = params["enter"].as_bool().unwrap_or(false);
            let outcome = tokio::task::spawn_blocking(move || {
                monitor.send_text(&pane_id, &text, enter)
            })
            .await
            .unwrap_or_else(|e| vdemon_mux::SendOutcome::failed(e.to_string()));
            serde_json::json!(outcome)
        }
        "send_keys" => {
            let monitor = Arc::clone(monitor);
            let pane_id = params["pane_id"].as_str().unwrap_or("").to_owned();
            let keys: Vec<String> = params["keys"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            let outcome =
                tokio::task::spawn_blocking(move || monitor.send_keys(&pane_id, &keys))
                    .await
                    .unwrap_or_else(|e| vdemon_mux::SendOutcome::failed(e.to_string()));
            serde_json::json!(outcome)
        }
        "send_raw" => {
            let monitor = Arc::clone(monitor);
            let pane_id = params["pane_id"].as_str().unwrap_or("").to_owned();
            let allow_unsafe = params["unsafe"].as_bool().unwrap_or(false);
            let items: Vec<RawItem> =
                serde_json::from_value(params["items"].clone()).unwrap_or_default();
            let outcome = tokio::task::spawn_blocking(move || {
                monitor.send_raw(&pane_id, &items, allow_unsafe)
            })
            .await
            .unwrap_or_else(|e| vdemon_mux::SendOutcome::failed(e.to_string()));
            serde_json::json!(outcome)
        }
        "screen_capture" => {
            let pane_id = params["pane_id"].as_str().unwrap_or("");
            let use_alt = params["alt"].as_bool().unwrap_or(false);
            match monitor.get_screen_capture(pane_id, use_alt).await {
                Some(content) => serde_json::json!({ "ok": true, "content": content }),
                None => serde_json::json!({
                    "ok": false,
                    "error": { "code": "INTERNAL" },
                }),
            }
        }
        "subscribe_push" => match serde_json::from_value::<Subscription>(params.clone()) {
            Ok(subscription) => {
                monitor
                    .subscriptions()
                    .lock()
                    .expect("subscription store lock")
                    .add(subscription);
                serde_json::json!({ "ok": true })
            }
            Err(e) => serde_json::json!({
                "ok": false,
                "error": { "code": "BAD_REQUEST", "message": e.to_string() },
            }),
        },
        "unsubscribe_push" => {
            let id = params["id"].as_str().unwrap_or("");
            let removed = monitor
                .subscriptions()
                .lock()
                .expect("subscription store lock")
                .remove(id);
            serde_json::json!({ "ok": removed })
        }
        "status" => {
            let sessions = monitor.snapshot().await;
            serde_json::json!({
                "sessions": sessions.len(),
                "backend_error": monitor.last_backend_error().await,
            })
        }
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use vdemon_monitor::{MonitorConfig, ProcessEntry, ProcessInspector, PushError, PushSender};
    use vdemon_mux::{AttachOutcome, MuxAdapter, MuxError, PaneInfo, SendOutcome};

    struct EmptyAdapter;

    impl MuxAdapter for EmptyAdapter {
        fn list_panes(&self) -> Result<Vec<PaneInfo>, MuxError> {
            Ok(Vec::new())
        }
        fn read_user_option(&self, _: &str, _: &str) -> Result<Option<String>, MuxError> {
            Ok(None)
        }
        fn attach_pipe(
            &self,
            _: &str,
            _: &Path,
            _: &PaneInfo,
        ) -> Result<AttachOutcome, MuxError> {
            Ok(AttachOutcome::default())
        }
        fn capture_tail(&self, _: &str, _: bool) -> Option<String> {
            Some("captured".to_owned())
        }
        fn send_text(&self, _: &str, _: &str, _: bool) -> SendOutcome {
            SendOutcome::ok()
        }
        fn send_keys(&self, _: &str, _: &[String]) -> SendOutcome {
            SendOutcome::ok()
        }
        fn send_raw(&self, _: &str, _: &[RawItem], _: bool) -> SendOutcome {
            SendOutcome::ok()
        }
        fn kill_pane(&self, _: &str) -> Result<(), MuxError> {
            Ok(())
        }
    }

    struct NoProcesses;
    impl ProcessInspector for NoProcesses {
        fn snapshot(&self) -> Vec<ProcessEntry> {
            Vec::new()
        }
    }

    struct NullSender;
    impl PushSender for NullSender {
        fn send(&self, _: &str, _: &serde_json::Value) -> Result<u16, PushError> {
            Ok(200)
        }
    }

    fn monitor() -> (Arc<SessionMonitor>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = MonitorConfig {
            base_dir: dir.path().to_path_buf(),
            ..MonitorConfig::default()
        };
        let monitor = Arc::new(SessionMonitor::new(
            config,
            Arc::new(EmptyAdapter),
            Arc::new(NoProcesses),
            Arc::new(NullSender),
        ));
        (monitor, dir)
    }

    #[tokio::test]
    async fn list_sessions_empty() {
        let (monitor, _dir) = monitor();
        let result = dispatch("list_sessions", &serde_json::json!({}), &monitor)
            .await
            .expect("known method");
        assert_eq!(result, serde_json::json!([]));
    }

    #[tokio::test]
    async fn unknown_method_is_none() {
        let (monitor, _dir) = monitor();
        assert!(dispatch("bogus", &serde_json::json!({}), &monitor).await.is_none());
    }

    #[tokio::test]
    async fn screen_capture_reports_content() {
        let (monitor, _dir) = monitor();
        let result = dispatch(
            "screen_capture",
            &serde_json::json!({"pane_id": "%1"}),
            &monitor,
        )
        .await
        .expect("known method");
        assert_eq!(result["ok"], true);
        assert_eq!(result["content"], "captured");
    }

    #[tokio::test]
    async fn push_subscription_roundtrip() {
        let (monitor, _dir) = monitor();
        let result = dispatch(
            "subscribe_push",
            &serde_json::json!({"id": "sub-1", "url": "https://push.example/x"}),
            &monitor,
        )
        .await
        .expect("known method");
        assert_eq!(result["ok"], true);

        let result = dispatch(
            "unsubscribe_push",
            &serde_json::json!({"id": "sub-1"}),
            &monitor,
        )
        .await
        .expect("known method");
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn hook_event_rejects_bad_payload() {
        let (monitor, _dir) = monitor();
        let result = dispatch(
            "hook_event",
            &serde_json::json!({"hook_event_name": "Stop"}),
            &monitor,
        )
        .await
        .expect("known method");
        assert_eq!(result["ok"], false);
    }
}
