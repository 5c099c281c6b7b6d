use anyhow::{Context, Result};
use itergate_core::spec::audit::AuditConfig;
use itergate_core::state::SessionState;
use itergate_core::types::AuditEventType;

use super::atomic::{atomic_write, AdvisoryLock};
use super::audit_log::append_audit;
use super::store::audit_path_for;

/// Coordinated session writer: lock, mutate, audit, atomic write, unlock.
///
/// Every CLI mutation follows the same protocol:
/// 1. Acquire the advisory lock (`acquire`)
/// 2. The caller loads the current state and applies its mutation
/// 3. Append audit entries allowed by `AuditConfig` (`maybe_audit`)
/// 4. Atomically write the new state (`write_state`)
/// 5. Release the lock (on drop)
pub struct StateWriter {
    state_path: String,
    audit_path: String,
    _lock: AdvisoryLock,
}

impl StateWriter {
    pub fn acquire(state_path: &str) -> Result<Self> {
        let lock = AdvisoryLock::acquire(state_path)
            .with_context(|| format!("cannot lock session {state_path}"))?;
        Ok(Self {
            state_path: state_path.to_string(),
            audit_path: audit_path_for(state_path),
            _lock: lock,
        })
    }

    pub fn write_state(&self, state: &SessionState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        atomic_write(&self.state_path, json.as_bytes())
            .with_context(|| format!("cannot write session {}", self.state_path))
    }

    /// Append an audit entry if the config allows this event type. Without a
    /// config every event is audited. Returns whether an entry was written.
    pub fn maybe_audit(
        &self,
        audit: Option<&AuditConfig>,
        event_type: AuditEventType,
        entry: &serde_json::Value,
    ) -> Result<bool> {
        let default = AuditConfig::default();
        if !should_audit(audit.unwrap_or(&default), event_type) {
            tracing::debug!(event = event_type.as_str(), "audit suppressed by config");
            return Ok(false);
        }
        append_audit(&self.audit_path, event_type, entry)?;
        Ok(true)
    }

    pub fn audit_path(&self) -> &str {
        &self.audit_path
    }
}

fn should_audit(config: &AuditConfig, event_type: AuditEventType) -> bool {
    match event_type {
        AuditEventType::PhaseTransition => config.log_transitions,
        AuditEventType::IterationRecorded => config.log_iterations,
        AuditEventType::SessionStarted | AuditEventType::Escalation | AuditEventType::Abort => true,
    }
}
