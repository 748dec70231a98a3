//! Pane classification: which agent (if any) runs in a pane.
//!
//! Pure over `PaneInfo` plus an OS process probe. Probe results are
//! cached (~5 s TTL); nothing here touches the registry.

use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vdemon_core::AgentKind;
use vdemon_mux::PaneInfo;

/// Literal agent substrings, matched case-insensitively. First hit wins.
const AGENT_TOKENS: &[(&str, AgentKind)] = &[
    ("codex", AgentKind::Codex),
    ("claude", AgentKind::Claude),
];

/// Editor binaries that host files, not agents. A pane whose foreground
/// command is one of these (without an agent token in argv or title) is
/// ignored entirely.
const EDITOR_BINARIES: &[&str] = &["vim", "nvim", "vi", "gvim", "nvim-qt", "neovim"];

const CACHE_TTL: Duration = Duration::from_secs(5);

/// Classifier verdict for a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Agent(AgentKind),
    /// Editor host; the pane never enters the registry.
    Ignored,
    Unknown,
}

// ─── Process probe ───────────────────────────────────────────────

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub ppid: u32,
    pub tty: String,
    pub command: String,
}

/// OS process-table probe, trait-bounded for test injection.
pub trait ProcessInspector: Send + Sync {
    fn snapshot(&self) -> Vec<ProcessEntry>;
}

/// `ps`-based inspector used in production.
#[derive(Debug, Default)]
pub struct PsProcessInspector;

impl ProcessInspector for PsProcessInspector {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        let output = match Command::new("ps")
            .args(["-eo", "pid=,ppid=,tty=,args="])
            .output()
        {
            Ok(out) if out.status.success() => out.stdout,
            _ => return Vec::new(),
        };
        parse_ps_output(&String::from_utf8_lossy(&output))
    }
}

fn parse_ps_output(output: &str) -> Vec<ProcessEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let (Some(pid), Some(ppid), Some(tty)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let (Ok(pid), Ok(ppid)) = (pid.parse(), ppid.parse()) else {
            continue;
        };
        let command = fields.collect::<Vec<_>>().join(" ");
        entries.push(ProcessEntry {
            pid,
            ppid,
            tty: tty.to_owned(),
            command,
        });
    }
    entries
}

// ─── Matching helpers ────────────────────────────────────────────

fn match_agent_token(text: &str) -> Option<AgentKind> {
    let lower = text.to_ascii_lowercase();
    AGENT_TOKENS
        .iter()
        .find(|(token, _)| lower.contains(token))
        .map(|(_, agent)| *agent)
}

fn command_basename(command: &str) -> String {
    let first = command.split_whitespace().next().unwrap_or("");
    first
        .rsplit('/')
        .next()
        .unwrap_or(first)
        .to_ascii_lowercase()
}

fn is_editor(command: &str) -> bool {
    EDITOR_BINARIES.contains(&command_basename(command).as_str())
}

// ─── Classifier ──────────────────────────────────────────────────

/// Stateful classifier holding the probe and its TTL caches.
pub struct PaneClassifier {
    inspector: Arc<dyn ProcessInspector>,
    snapshot: Option<(Instant, Vec<ProcessEntry>)>,
    pid_cache: HashMap<u32, (Instant, Option<AgentKind>)>,
    tty_cache: HashMap<String, (Instant, Option<AgentKind>)>,
}

impl PaneClassifier {
    pub fn new(inspector: Arc<dyn ProcessInspector>) -> Self {
        Self {
            inspector,
            snapshot: None,
            pid_cache: HashMap::new(),
            tty_cache: HashMap::new(),
        }
    }

    /// Classify a pane:
    /// 1. agent token in current command / start command / title
    /// 2. editor foreground without agent hints → ignored
    /// 3. pane pid's own command
    /// 4. any descendant of the pane pid
    /// 5. any process on the pane tty
    pub fn classify(&mut self, pane: &PaneInfo) -> Classification {
        for text in [
            pane.current_command.as_str(),
            pane.pane_start_command.as_str(),
            pane.pane_title.as_str(),
        ] {
            if let Some(agent) = match_agent_token(text) {
                return Classification::Agent(agent);
            }
        }

        if is_editor(&pane.current_command) {
            return Classification::Ignored;
        }

        if let Some(pid) = pane.pane_pid {
            if let Some(agent) = self.agent_for_pid(pid) {
                return Classification::Agent(agent);
            }
            if let Some(agent) = self.agent_in_descendants(pid) {
                return Classification::Agent(agent);
            }
        }

        if !pane.pane_tty.is_empty()
            && let Some(agent) = self.agent_for_tty(&pane.pane_tty)
        {
            return Classification::Agent(agent);
        }

        Classification::Unknown
    }

    fn processes(&mut self) -> &[ProcessEntry] {
        let stale = self
            .snapshot
            .as_ref()
            .is_none_or(|(taken, _)| taken.elapsed() > CACHE_TTL);
        if stale {
            self.snapshot = Some((Instant::now(), self.inspector.snapshot()));
        }
        &self
            .snapshot
            .as_ref()
            .expect("snapshot populated above")
            .1
    }

    fn agent_for_pid(&mut self, pid: u32) -> Option<AgentKind> {
        if let Some((cached_at, agent)) = self.pid_cache.get(&pid)
            && cached_at.elapsed() <= CACHE_TTL
        {
            return *agent;
        }
        let agent = self
            .processes()
            .iter()
            .find(|p| p.pid == pid)
            .and_then(|p| match_agent_token(&p.command));
        self.pid_cache.insert(pid, (Instant::now(), agent));
        agent
    }

    fn agent_in_descendants(&mut self, root_pid: u32) -> Option<AgentKind> {
        let processes = self.processes().to_vec();
        let mut frontier = vec![root_pid];
        let mut matched = None;
        while let Some(parent) = frontier.pop() {
            for child in processes.iter().filter(|p| p.ppid == parent) {
                if let Some(agent) = match_agent_token(&child.command) {
                    matched = Some(agent);
                    break;
                }
                frontier.push(child.pid);
            }
            if matched.is_some() {
                break;
            }
        }
        matched
    }

    fn agent_for_tty(&mut self, pane_tty: &str) -> Option<AgentKind> {
        if let Some((cached_at, agent)) = self.tty_cache.get(pane_tty)
            && cached_at.elapsed() <= CACHE_TTL
        {
            return *agent;
        }
        // ps reports ttys without the /dev/ prefix.
        let short = pane_tty.strip_prefix("/dev/").unwrap_or(pane_tty);
        let agent = self
            .processes()
            .iter()
            .find(|p| p.tty == short && match_agent_token(&p.command).is_some())
            .and_then(|p| match_agent_token(&p.command));
        self.tty_cache
            .insert(pane_tty.to_owned(), (Instant::now(), agent));
        agent
    }
}
