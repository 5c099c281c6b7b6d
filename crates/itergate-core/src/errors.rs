use crate::metrics::MetricName;
use crate::types::Phase;

#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error("missing metric: {0}")]
    Missing(MetricName),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GateSetError {
    #[error("gate set is empty")]
    Empty,
    #[error("duplicate gate name: {0}")]
    DuplicateGate(String),
    #[error("gate {0} has no criteria")]
    NoCriteria(String),
    #[error("invalid gate name '{0}': use letters, digits, '_', '-' or '.'")]
    InvalidName(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("invalid gate results: {0}")]
    InvalidGateResult(String),
    #[error("iteration index must be at least 1, got {0}")]
    InvalidIteration(u32),
    #[error("max_iterations must be at least 1")]
    InvalidBudget,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("illegal transition: cannot {action} in phase {from}")]
    Illegal { from: Phase, action: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Metric(#[from] MetricError),
    #[error(transparent)]
    Decision(#[from] DecisionError),
    #[error(transparent)]
    GateSet(#[from] GateSetError),
    #[error("max_iterations must be at least 1")]
    InvalidBudget,
    #[error("corrupt session state: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReportParseError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("line {line}: unexpected '{content}'")]
    InvalidLine { line: usize, content: String },
    #[error("invalid {field} '{value}'")]
    InvalidValue { field: &'static str, value: String },
}

/// Structured check result for `igate check --json`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckReport {
    pub file: String,
    pub version: String,
    pub pass: bool,
    pub errors: Vec<CheckIssue>,
    pub warnings: Vec<CheckIssue>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckIssue {
    pub code: String,
    pub check: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
