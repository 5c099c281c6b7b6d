use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{MetricName, Metrics};
use crate::spec::audit::AuditConfig;
use crate::spec::gates::Gate;
use crate::types::{CriterionOp, Phase, Recommendation, TransitionTrigger};

/// Persistent state of one workflow session.
///
/// The engine's `WorkflowSession` is the only writer; this type is what goes
/// to disk and what comes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub name: String,
    pub phase: Phase,
    pub max_iterations: u32,
    pub gates: Vec<Gate>,
    #[serde(default)]
    pub history: Vec<IterationRecord>,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
    pub state_rev: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Audit settings carried over from the workflow document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditConfig>,
}

impl SessionState {
    pub fn new(name: String, gates: Vec<Gate>, max_iterations: u32) -> Self {
        let now = Utc::now();
        Self {
            name,
            phase: Phase::Discovery,
            max_iterations,
            gates,
            history: Vec::new(),
            transitions: Vec::new(),
            state_rev: 0,
            created_at: now,
            updated_at: now,
            audit: None,
        }
    }
}

/// One developer attempt, judged. Immutable once appended to a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub index: u32,
    pub metrics: Metrics,
    pub gate_results: Vec<GateResult>,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub feedback: Vec<FeedbackItem>,
    pub metrics_hash: String,
    pub recorded_at: DateTime<Utc>,
}

impl IterationRecord {
    pub fn all_passed(&self) -> bool {
        self.gate_results.iter().all(|r| r.pass)
    }

    pub fn failing_gates(&self) -> Vec<&str> {
        self.gate_results
            .iter()
            .filter(|r| !r.pass)
            .map(|r| r.gate.as_str())
            .collect()
    }
}

/// Outcome of one gate for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: String,
    pub pass: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<CriteriaResult>,
}

impl GateResult {
    /// A bare outcome with no criterion detail, as supplied by an external
    /// orchestrator.
    pub fn bare(gate: impl Into<String>, pass: bool) -> Self {
        Self {
            gate: gate.into(),
            pass,
            criteria: Vec::new(),
        }
    }
}

/// Result of evaluating a single criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaResult {
    pub metric: MetricName,
    pub op: CriterionOp,
    pub value: serde_json::Value,
    pub actual: serde_json::Value,
    pub pass: bool,
}

/// One failing gate reported back to the developer.
///
/// `fix_location` is a placeholder for a human reviewer; the engine only knows
/// which gate failed, never where the fix belongs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    pub priority: u32,
    pub gate: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fix_location: Option<String>,
}

/// Record of an applied phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    pub trigger: TransitionTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
    /// The state_rev produced by this transition.
    pub state_rev: u64,
}
