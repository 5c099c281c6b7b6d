use anyhow::{Context, Result};
use itergate_core::state::SessionState;

use super::atomic::atomic_write;
use super::session::WorkflowSession;

/// Load raw session state from a file.
pub fn load_state(path: &str) -> Result<SessionState> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read session {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("{path}: invalid session JSON"))
}

/// Load a session and check its invariants.
pub fn load_session(path: &str) -> Result<WorkflowSession> {
    let state = load_state(path)?;
    WorkflowSession::from_state(state).with_context(|| format!("{path}: rejected session"))
}

/// Save session state atomically. Callers mutating a shared file should go
/// through `StateWriter` to hold the lock.
pub fn save_state(path: &str, state: &SessionState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    atomic_write(path, json.as_bytes()).with_context(|| format!("cannot write session {path}"))
}

/// Audit log path that belongs to a session file.
pub fn audit_path_for(state_path: &str) -> String {
    match state_path.strip_suffix(".session.json") {
        Some(stem) => format!("{stem}.audit.jsonl"),
        None => format!("{state_path}.audit.jsonl"),
    }
}
