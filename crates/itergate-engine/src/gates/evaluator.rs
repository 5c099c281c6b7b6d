use std::collections::HashSet;

use sha2::{Digest, Sha256};

use itergate_core::errors::{GateSetError, MetricError};
use itergate_core::metrics::{MetricName, Metrics};
use itergate_core::spec::gates::{Criterion, Gate};
use itergate_core::state::{CriteriaResult, GateResult};
use itergate_core::types::CriterionOp;

/// Immutable, ordered table of quality gates.
///
/// Declaration order is significant: results and feedback are always
/// reported in it, and it is the tie-break when several gates fail.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityGateSet {
    gates: Vec<Gate>,
}

impl QualityGateSet {
    pub fn new(gates: Vec<Gate>) -> Result<Self, GateSetError> {
        if gates.is_empty() {
            return Err(GateSetError::Empty);
        }
        let mut seen = HashSet::new();
        for gate in &gates {
            if !is_valid_name(&gate.name) {
                return Err(GateSetError::InvalidName(gate.name.clone()));
            }
            if !seen.insert(gate.name.as_str()) {
                return Err(GateSetError::DuplicateGate(gate.name.clone()));
            }
            if gate.criteria.is_empty() {
                return Err(GateSetError::NoCriteria(gate.name.clone()));
            }
        }
        Ok(Self { gates })
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.gates.iter().map(|g| g.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.name == name)
    }

    pub fn into_gates(self) -> Vec<Gate> {
        self.gates
    }

    /// Evaluate every gate against one metrics report.
    ///
    /// Returns one result per declared gate, in declaration order. Every
    /// metric the table references must be present; the first absent one is
    /// reported and nothing is evaluated.
    pub fn evaluate(&self, metrics: &Metrics) -> Result<Vec<GateResult>, MetricError> {
        for metric in self.required_metrics() {
            metrics.require(metric)?;
        }

        let results: Vec<GateResult> = self
            .gates
            .iter()
            .map(|gate| {
                let criteria = evaluate_criteria(&gate.criteria, metrics);
                GateResult {
                    gate: gate.name.clone(),
                    pass: criteria.iter().all(|c| c.pass),
                    criteria,
                }
            })
            .collect();

        tracing::debug!(
            gates = results.len(),
            failing = results.iter().filter(|r| !r.pass).count(),
            "evaluated gates"
        );
        Ok(results)
    }

    /// Metrics referenced by any criterion, in canonical metric order.
    pub fn required_metrics(&self) -> Vec<MetricName> {
        MetricName::ALL
            .into_iter()
            .filter(|m| {
                self.gates
                    .iter()
                    .any(|g| g.criteria.iter().any(|c| c.metric == *m))
            })
            .collect()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn evaluate_criteria(criteria: &[Criterion], metrics: &Metrics) -> Vec<CriteriaResult> {
    criteria
        .iter()
        .map(|criterion| {
            let actual = metrics
                .get(criterion.metric)
                .unwrap_or(serde_json::Value::Null);
            let pass = compare_values(&criterion.op, &actual, &criterion.value);
            CriteriaResult {
                metric: criterion.metric,
                op: criterion.op,
                value: criterion.value.clone(),
                actual,
                pass,
            }
        })
        .collect()
}

/// Compute a deterministic hash of a metrics report.
pub fn compute_metrics_hash(metrics: &Metrics) -> String {
    let canonical: Vec<String> = MetricName::ALL
        .into_iter()
        .filter_map(|m| metrics.get(m).map(|v| format!("{m}:{v}")))
        .collect();
    let joined = canonical.join(",");
    format!("sha256:{:x}", Sha256::digest(joined.as_bytes()))
}

fn compare_values(
    op: &CriterionOp,
    actual: &serde_json::Value,
    expected: &serde_json::Value,
) -> bool {
    match op {
        CriterionOp::Eq => values_equal(actual, expected),
        CriterionOp::Neq => !values_equal(actual, expected),
        CriterionOp::Gt => cmp_num(actual, expected).is_some_and(|c| c > 0),
        CriterionOp::Gte => cmp_num(actual, expected).is_some_and(|c| c >= 0),
        CriterionOp::Lt => cmp_num(actual, expected).is_some_and(|c| c < 0),
        CriterionOp::Lte => cmp_num(actual, expected).is_some_and(|c| c <= 0),
    }
}

// 0 and 0.0 must compare equal; serde_json keeps integer and float apart.
fn values_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match cmp_num(a, b) {
        Some(c) => c == 0,
        None => a == b,
    }
}

fn cmp_num(a: &serde_json::Value, b: &serde_json::Value) -> Option<i8> {
    let a_f = a.as_f64()?;
    let b_f = b.as_f64()?;
    if a_f > b_f {
        Some(1)
    } else if a_f < b_f {
        Some(-1)
    } else {
        Some(0)
    }
}
