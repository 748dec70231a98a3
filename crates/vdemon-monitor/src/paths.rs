//! On-disk layout: base directory, server keys, pane log naming, and
//! size-bounded log rotation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use vdemon_core::fnv1a64;

/// `~/.vde-monitor`, or a relative fallback when HOME is unset.
pub fn default_base_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".vde-monitor"),
        None => PathBuf::from(".vde-monitor"),
    }
}

/// Stable key for a `(socket_name, socket_path)` pair. FNV keeps the key
/// identical across restarts and hosts.
pub fn server_key(socket_name: Option<&str>, socket_path: Option<&str>) -> String {
    let mut input = String::new();
    input.push_str(socket_name.unwrap_or("default"));
    input.push('\0');
    input.push_str(socket_path.unwrap_or(""));
    format!("{:016x}", fnv1a64(input.as_bytes()))
}

/// Filesystem-safe pane id: every non-alphanumeric byte becomes `_`.
pub fn safe_pane_id(pane_id: &str) -> String {
    pane_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Create the file (and parents) if missing; append-safe no-op otherwise.
pub fn ensure_file(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

/// Rotate `path` if it exceeds `max_bytes`: copy to `<path>.<epochMs>`
/// and truncate in place so concurrent appenders keep their inode, then
/// unlink rotations beyond the newest `retain`.
///
/// Returns `true` when a rotation happened.
pub fn rotate_if_oversized(
    path: &Path,
    max_bytes: u64,
    retain: usize,
    epoch_ms: i64,
) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size <= max_bytes {
        return Ok(false);
    }

    let rotated = rotation_name(path, epoch_ms);
    fs::copy(path, &rotated)?;
    fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)?;

    prune_rotations(path, retain)?;
    Ok(true)
}

fn rotation_name(path: &Path, epoch_ms: i64) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{file_name}.{epoch_ms}"))
}

/// Keep the newest `retain` rotations of `path`; unlink the rest.
pub fn prune_rotations(path: &Path, retain: usize) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(());
    };
    let prefix = format!("{file_name}.");

    let mut rotations: Vec<(i64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stamp) = name.strip_prefix(&prefix)
            && let Ok(epoch_ms) = stamp.parse::<i64>()
        {
            rotations.push((epoch_ms, entry.path()));
        }
    }

    if rotations.len() <= retain {
        return Ok(());
    }
    rotations.sort_by_key(|(epoch_ms, _)| *epoch_ms);
    let excess = rotations.len() - retain;
    for (_, stale) in rotations.into_iter().take(excess) {
        let _ = fs::remove_file(stale);
    }
    Ok(())
}
