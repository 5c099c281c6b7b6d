use std::collections::HashMap;

use itergate_core::errors::DecisionError;
use itergate_core::state::{FeedbackItem, GateResult};
use itergate_core::types::Recommendation;
use serde::{Deserialize, Serialize};

use super::evaluator::QualityGateSet;

/// Recommendation plus the feedback payload handed back to the developer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub recommendation: Recommendation,
    pub feedback: Vec<FeedbackItem>,
}

impl Decision {
    pub fn feedback_gates(&self) -> Vec<&str> {
        self.feedback.iter().map(|f| f.gate.as_str()).collect()
    }
}

/// Turns one iteration's gate results into Accept / Iterate / Escalate.
///
/// Algorithm:
/// 1. All gates pass: Accept, no feedback
/// 2. Some gate fails and budget remains (`iteration < max_iterations`): Iterate
/// 3. Some gate fails and the budget is spent: Escalate
///
/// Feedback lists failing gates in declaration order. Stateless; the same
/// input always yields the same decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn decide(
        &self,
        gates: &QualityGateSet,
        results: &[GateResult],
        iteration: u32,
        max_iterations: u32,
    ) -> Result<Decision, DecisionError> {
        if iteration == 0 {
            return Err(DecisionError::InvalidIteration(iteration));
        }
        if max_iterations == 0 {
            return Err(DecisionError::InvalidBudget);
        }
        let outcomes = index_results(gates, results)?;

        // Walk the declared table, not the results, so feedback order never
        // depends on how the caller ordered its results.
        let failing: Vec<FeedbackItem> = gates
            .gates()
            .iter()
            .filter(|g| !outcomes[g.name.as_str()])
            .zip(1u32..)
            .map(|(g, priority)| FeedbackItem {
                priority,
                gate: g.name.clone(),
                description: g.description.clone(),
                fix_location: None,
            })
            .collect();

        let recommendation = if failing.is_empty() {
            Recommendation::Accept
        } else if iteration < max_iterations {
            Recommendation::Iterate
        } else {
            Recommendation::Escalate
        };

        tracing::debug!(
            iteration,
            max_iterations,
            failing = failing.len(),
            %recommendation,
            "decided iteration"
        );

        Ok(Decision {
            recommendation,
            feedback: failing,
        })
    }
}

fn index_results<'a>(
    gates: &QualityGateSet,
    results: &'a [GateResult],
) -> Result<HashMap<&'a str, bool>, DecisionError> {
    let mut outcomes = HashMap::with_capacity(results.len());
    for r in results {
        if gates.get(&r.gate).is_none() {
            return Err(DecisionError::InvalidGateResult(format!(
                "unknown gate '{}'",
                r.gate
            )));
        }
        if outcomes.insert(r.gate.as_str(), r.pass).is_some() {
            return Err(DecisionError::InvalidGateResult(format!(
                "gate '{}' reported twice",
                r.gate
            )));
        }
    }
    let missing: Vec<&str> = gates.names().filter(|n| !outcomes.contains_key(n)).collect();
    if !missing.is_empty() {
        return Err(DecisionError::InvalidGateResult(format!(
            "no result for {}",
            missing.join(", ")
        )));
    }
    Ok(outcomes)
}
