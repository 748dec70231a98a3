//! UDS client for the CLI subcommands.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// One request/response roundtrip against the daemon socket.
pub async fn request(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = UnixStream::connect(socket_path).await.map_err(|e| {
        anyhow::anyhow!("cannot reach daemon at {socket_path}: {e} (is `vdemon daemon` running?)")
    })?;
    let (reader, mut writer) = stream.into_split();

    let mut payload = serde_json::json!({
        "method": method,
        "params": params,
        "id": 1,
    })
    .to_string();
    payload.push('\n');
    writer.write_all(payload.as_bytes()).await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("daemon error: {error}");
    }
    Ok(response["result"].clone())
}

/// `vdemon status`: print the monitored sessions.
pub async fn cmd_status(socket_path: &str) -> anyhow::Result<()> {
    let sessions = request(socket_path, "list_sessions", serde_json::json!({})).await?;
    let Some(sessions) = sessions.as_array() else {
        anyhow::bail!("unexpected response shape");
    };

    if sessions.is_empty() {
        println!("no monitored sessions");
        return Ok(());
    }

    println!(
        "{:<8} {:<12} {:<8} {:<20} {:<10} TITLE",
        "PANE", "SESSION", "AGENT", "STATE", "PIPE"
    );
    for session in sessions {
        let pane_id = session["pane_id"].as_str().unwrap_or("?");
        let session_name = session["session_name"].as_str().unwrap_or("?");
        let agent = session["agent"].as_str().unwrap_or("?");
        let state = session["state"].as_str().unwrap_or("?");
        let pipe = if session["pipe_conflict"].as_bool().unwrap_or(false) {
            "conflict"
        } else if session["pipe_attached"].as_bool().unwrap_or(false) {
            "attached"
        } else {
            "-"
        };
        let title = session["custom_title"]
            .as_str()
            .or_else(|| session["title"].as_str())
            .unwrap_or("");
        println!("{pane_id:<8} {session_name:<12} {agent:<8} {state:<20} {pipe:<10} {title}");
    }
    Ok(())
}
