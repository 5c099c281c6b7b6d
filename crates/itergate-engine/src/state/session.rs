use chrono::Utc;

use itergate_core::errors::{SessionError, TransitionError};
use itergate_core::metrics::Metrics;
use itergate_core::spec::audit::AuditConfig;
use itergate_core::state::{IterationRecord, SessionState, TransitionRecord};
use itergate_core::types::{Phase, Recommendation, TransitionTrigger};

use crate::gates::decision::{Decision, DecisionEngine};
use crate::gates::evaluator::{compute_metrics_hash, QualityGateSet};

/// One unit of work moving through the iteration lifecycle.
///
/// ```text
/// Discovery --approve--> Development --accept--> Completion
///                          |    ^
///                  iterate |    | fix recorded
///                          v    |
///                        Refinement
///
/// any non-terminal --escalate--> Escalated
/// any non-terminal --abort-----> Aborted
/// ```
///
/// The session owns its history. Operations either apply fully or return an
/// error and leave the session untouched.
#[derive(Debug, Clone)]
pub struct WorkflowSession {
    state: SessionState,
    gates: QualityGateSet,
    engine: DecisionEngine,
}

impl WorkflowSession {
    pub fn new(
        name: impl Into<String>,
        gates: QualityGateSet,
        max_iterations: u32,
    ) -> Result<Self, SessionError> {
        if max_iterations == 0 {
            return Err(SessionError::InvalidBudget);
        }
        let state = SessionState::new(name.into(), gates.gates().to_vec(), max_iterations);
        Ok(Self {
            state,
            gates,
            engine: DecisionEngine,
        })
    }

    /// Rebuild a session from persisted state, checking every invariant.
    pub fn from_state(state: SessionState) -> Result<Self, SessionError> {
        if state.max_iterations == 0 {
            return Err(SessionError::InvalidBudget);
        }
        let gates = QualityGateSet::new(state.gates.clone())?;
        validate_history(&state, &gates)?;
        Ok(Self {
            state,
            gates,
            engine: DecisionEngine,
        })
    }

    pub fn with_audit(mut self, audit: Option<AuditConfig>) -> Self {
        self.state.audit = audit;
        self
    }

    pub fn audit_config(&self) -> Option<&AuditConfig> {
        self.state.audit.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn max_iterations(&self) -> u32 {
        self.state.max_iterations
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.state.history
    }

    pub fn latest(&self) -> Option<&IterationRecord> {
        self.state.history.last()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.state.transitions
    }

    pub fn gates(&self) -> &QualityGateSet {
        &self.gates
    }

    pub fn remaining_iterations(&self) -> u32 {
        self.state
            .max_iterations
            .saturating_sub(self.state.history.len() as u32)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }

    /// External approval signal: Discovery to Development.
    pub fn approve(&mut self, approver: &str) -> Result<&TransitionRecord, TransitionError> {
        if self.state.phase != Phase::Discovery {
            return Err(self.illegal("approve"));
        }
        Ok(self.transition(
            Phase::Development,
            TransitionTrigger::Approval,
            None,
            Some(format!("approved by {approver}")),
        ))
    }

    /// Record one developer attempt and apply the resulting decision.
    ///
    /// Allowed in Development (first attempt) and Refinement (a fix). In
    /// Refinement the session first returns to Development, then the new
    /// record is judged like any other.
    pub fn record_iteration(&mut self, metrics: Metrics) -> Result<&IterationRecord, SessionError> {
        if !matches!(self.state.phase, Phase::Development | Phase::Refinement) {
            return Err(self.illegal("record an iteration").into());
        }

        let index = self.state.history.len() as u32 + 1;
        let gate_results = self.gates.evaluate(&metrics)?;
        let Decision {
            recommendation,
            feedback,
        } = self
            .engine
            .decide(&self.gates, &gate_results, index, self.state.max_iterations)?;

        // Nothing below can fail, so the session only changes once the
        // attempt has been fully judged.
        let metrics_hash = compute_metrics_hash(&metrics);
        if let Some(prev) = self.latest() {
            if prev.metrics_hash == metrics_hash {
                tracing::warn!(
                    session = %self.state.name,
                    iteration = index,
                    previous = prev.index,
                    "metrics unchanged since previous iteration"
                );
            }
        }

        if self.state.phase == Phase::Refinement {
            self.transition(
                Phase::Development,
                TransitionTrigger::FixRecorded,
                Some(index),
                None,
            );
        }

        self.state.history.push(IterationRecord {
            index,
            metrics,
            gate_results,
            recommendation,
            feedback,
            metrics_hash,
            recorded_at: Utc::now(),
        });

        let (to, trigger) = match recommendation {
            Recommendation::Accept => (Phase::Completion, TransitionTrigger::Accept),
            Recommendation::Iterate => (Phase::Refinement, TransitionTrigger::Iterate),
            Recommendation::Escalate => (Phase::Escalated, TransitionTrigger::Escalate),
        };
        self.transition(to, trigger, Some(index), None);

        let record = &self.state.history[self.state.history.len() - 1];
        Ok(record)
    }

    /// External escalation from any non-terminal phase.
    pub fn escalate(&mut self, reason: &str) -> Result<&TransitionRecord, TransitionError> {
        if self.state.phase.is_terminal() {
            return Err(self.illegal("escalate"));
        }
        Ok(self.transition(
            Phase::Escalated,
            TransitionTrigger::ExternalEscalation,
            None,
            Some(reason.to_string()),
        ))
    }

    /// External abort from any non-terminal phase.
    pub fn abort(&mut self, reason: &str) -> Result<&TransitionRecord, TransitionError> {
        if self.state.phase.is_terminal() {
            return Err(self.illegal("abort"));
        }
        Ok(self.transition(
            Phase::Aborted,
            TransitionTrigger::Abort,
            None,
            Some(reason.to_string()),
        ))
    }

    fn illegal(&self, action: &'static str) -> TransitionError {
        TransitionError::Illegal {
            from: self.state.phase,
            action,
        }
    }

    fn transition(
        &mut self,
        to: Phase,
        trigger: TransitionTrigger,
        iteration: Option<u32>,
        reason: Option<String>,
    ) -> &TransitionRecord {
        let from = self.state.phase;
        debug_assert!(is_allowed(from, to), "{from} -> {to}");
        let now = Utc::now();

        self.state.phase = to;
        self.state.state_rev += 1;
        self.state.updated_at = now;
        self.state.transitions.push(TransitionRecord {
            from,
            to,
            trigger,
            iteration,
            reason,
            at: now,
            state_rev: self.state.state_rev,
        });

        tracing::info!(session = %self.state.name, %from, %to, ?trigger, "phase transition");
        &self.state.transitions[self.state.transitions.len() - 1]
    }
}

/// The transition table.
pub fn is_allowed(from: Phase, to: Phase) -> bool {
    use Phase::*;
    match (from, to) {
        (Discovery, Development)
        | (Development, Completion)
        | (Development, Refinement)
        | (Refinement, Development) => true,
        (f, Escalated | Aborted) => !f.is_terminal(),
        _ => false,
    }
}

fn validate_history(state: &SessionState, gates: &QualityGateSet) -> Result<(), SessionError> {
    let corrupt = |msg: String| Err(SessionError::Corrupt(msg));
    let len = state.history.len();

    if len > state.max_iterations as usize {
        return corrupt(format!(
            "{len} iterations recorded but max_iterations is {}",
            state.max_iterations
        ));
    }
    for (i, record) in state.history.iter().enumerate() {
        if record.index as usize != i + 1 {
            return corrupt(format!(
                "iteration at position {} has index {}",
                i + 1,
                record.index
            ));
        }
        let named: Vec<&str> = record.gate_results.iter().map(|r| r.gate.as_str()).collect();
        if !named.iter().copied().eq(gates.names()) {
            return corrupt(format!(
                "iteration {} gate results do not match the declared gates",
                record.index
            ));
        }
        // Each record must carry the decision its own gate results produce,
        // so only the final record can be Accept or Escalate.
        let expected = DecisionEngine
            .decide(gates, &record.gate_results, record.index, state.max_iterations)
            .map_err(|e| SessionError::Corrupt(format!("iteration {}: {e}", record.index)))?;
        if expected.recommendation != record.recommendation {
            return corrupt(format!(
                "iteration {} records {} but its gate results decide {}",
                record.index, record.recommendation, expected.recommendation
            ));
        }
        if i + 1 < len && record.recommendation != Recommendation::Iterate {
            return corrupt(format!(
                "iteration {} is {} but later iterations follow it",
                record.index, record.recommendation
            ));
        }
    }
    if len == state.max_iterations as usize && !state.phase.is_terminal() {
        return corrupt(format!(
            "budget of {len} spent but phase is {}",
            state.phase
        ));
    }
    if let Some(last) = state.history.last() {
        let expected = match last.recommendation {
            Recommendation::Accept => Phase::Completion,
            Recommendation::Iterate => Phase::Refinement,
            Recommendation::Escalate => Phase::Escalated,
        };
        // External escalation or abort may follow any recorded decision.
        let consistent = state.phase == expected
            || (last.recommendation == Recommendation::Iterate
                && matches!(state.phase, Phase::Escalated | Phase::Aborted));
        if !consistent {
            return corrupt(format!(
                "last recommendation {} inconsistent with phase {}",
                last.recommendation, state.phase
            ));
        }
    } else if matches!(state.phase, Phase::Refinement | Phase::Completion) {
        return corrupt(format!("phase {} without any iteration", state.phase));
    }
    for t in &state.transitions {
        if !is_allowed(t.from, t.to) {
            return corrupt(format!("illegal recorded transition {} -> {}", t.from, t.to));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use itergate_core::metrics::MetricName;
    use itergate_core::spec::gates::Gate;
    use itergate_core::types::CriterionOp;
    use serde_json::json;

    /// quality: critical_issues == 0; testing: scenarios_tested >= 5
    fn gates() -> QualityGateSet {
        QualityGateSet::new(vec![
            Gate::new("quality", "no critical issues").with(
                MetricName::CriticalIssues,
                CriterionOp::Eq,
                json!(0),
            ),
            Gate::new("testing", "scenarios exercised").with(
                MetricName::ScenariosTested,
                CriterionOp::Gte,
                json!(5),
            ),
        ])
        .unwrap()
    }

    fn metrics(quality: bool, testing: bool) -> Metrics {
        Metrics {
            critical_issues: Some(if quality { 0 } else { 2 }),
            scenarios_tested: Some(if testing { 6 } else { 1 }),
            ..Metrics::default()
        }
    }

    fn started(max: u32) -> WorkflowSession {
        let mut s = WorkflowSession::new("demo", gates(), max).unwrap();
        s.approve("manager").unwrap();
        s
    }

    fn path(s: &WorkflowSession) -> Vec<(Phase, Phase)> {
        s.transitions().iter().map(|t| (t.from, t.to)).collect()
    }

    #[test]
    fn iterate_then_accept() {
        let mut s = started(3);

        let first = s.record_iteration(metrics(false, true)).unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.recommendation, Recommendation::Iterate);
        assert_eq!(first.failing_gates(), vec!["quality"]);
        assert_eq!(first.feedback[0].gate, "quality");
        assert_eq!(s.phase(), Phase::Refinement);

        let second = s.record_iteration(metrics(true, true)).unwrap();
        assert_eq!(second.index, 2);
        assert_eq!(second.recommendation, Recommendation::Accept);
        assert!(second.feedback.is_empty());
        assert_eq!(s.phase(), Phase::Completion);

        assert_eq!(
            path(&s),
            vec![
                (Phase::Discovery, Phase::Development),
                (Phase::Development, Phase::Refinement),
                (Phase::Refinement, Phase::Development),
                (Phase::Development, Phase::Completion),
            ]
        );
        assert_eq!(s.state().state_rev, 4);
    }

    #[test]
    fn single_iteration_budget_escalates_without_iterate() {
        let mut s = started(1);
        let record = s.record_iteration(metrics(false, true)).unwrap();
        assert_eq!(record.recommendation, Recommendation::Escalate);
        assert_eq!(s.phase(), Phase::Escalated);
        assert!(s
            .history()
            .iter()
            .all(|r| r.recommendation != Recommendation::Iterate));
    }

    #[test]
    fn history_never_exceeds_budget() {
        for max in 1..=5 {
            let mut s = started(max);
            loop {
                match s.record_iteration(metrics(false, false)) {
                    Ok(_) => assert!(s.history().len() <= max as usize),
                    Err(SessionError::Transition(_)) => break,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            assert_eq!(s.history().len(), max as usize);
            assert_eq!(s.phase(), Phase::Escalated);
            assert_eq!(s.remaining_iterations(), 0);
        }
    }

    #[test]
    fn recording_before_approval_is_illegal() {
        let mut s = WorkflowSession::new("demo", gates(), 3).unwrap();
        let err = s.record_iteration(metrics(true, true)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transition(TransitionError::Illegal {
                from: Phase::Discovery,
                ..
            })
        ));
        assert!(s.history().is_empty());
        assert_eq!(s.phase(), Phase::Discovery);
    }

    #[test]
    fn approving_twice_is_illegal() {
        let mut s = started(3);
        assert_eq!(
            s.approve("manager").unwrap_err(),
            TransitionError::Illegal {
                from: Phase::Development,
                action: "approve"
            }
        );
    }

    #[test]
    fn terminal_phases_reject_everything() {
        let mut s = started(3);
        s.record_iteration(metrics(true, true)).unwrap();
        assert_eq!(s.phase(), Phase::Completion);
        assert!(s.record_iteration(metrics(true, true)).is_err());
        assert!(s.escalate("late").is_err());
        assert!(s.abort("late").is_err());
        assert!(s.approve("manager").is_err());
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn missing_metric_leaves_session_unchanged() {
        let mut s = started(3);
        let rev = s.state().state_rev;
        let partial = Metrics {
            critical_issues: Some(0),
            ..Metrics::default()
        };
        assert!(matches!(
            s.record_iteration(partial),
            Err(SessionError::Metric(_))
        ));
        assert!(s.history().is_empty());
        assert_eq!(s.phase(), Phase::Development);
        assert_eq!(s.state().state_rev, rev);
    }

    #[test]
    fn external_escalation_and_abort() {
        let mut s = WorkflowSession::new("demo", gates(), 3).unwrap();
        let t = s.escalate("requirements unclear").unwrap();
        assert_eq!(t.trigger, TransitionTrigger::ExternalEscalation);
        assert_eq!(t.reason.as_deref(), Some("requirements unclear"));
        assert_eq!(s.phase(), Phase::Escalated);

        let mut s = started(3);
        s.record_iteration(metrics(false, true)).unwrap();
        s.abort("superseded").unwrap();
        assert_eq!(s.phase(), Phase::Aborted);
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(matches!(
            WorkflowSession::new("demo", gates(), 0),
            Err(SessionError::InvalidBudget)
        ));
    }

    #[test]
    fn state_roundtrips_through_json() {
        let mut s = started(3);
        s.record_iteration(metrics(false, true)).unwrap();
        let json = serde_json::to_string(s.state()).unwrap();
        let state: SessionState = serde_json::from_str(&json).unwrap();
        let mut restored = WorkflowSession::from_state(state).unwrap();
        assert_eq!(restored.phase(), Phase::Refinement);
        assert_eq!(restored.history(), s.history());

        restored.record_iteration(metrics(true, true)).unwrap();
        assert_eq!(restored.phase(), Phase::Completion);
    }

    #[test]
    fn from_state_rejects_broken_invariants() {
        let mut s = started(2);
        s.record_iteration(metrics(false, true)).unwrap();

        let mut over = s.state().clone();
        over.max_iterations = 0;
        assert!(matches!(
            WorkflowSession::from_state(over),
            Err(SessionError::InvalidBudget)
        ));

        let mut reindexed = s.state().clone();
        reindexed.history[0].index = 7;
        assert!(matches!(
            WorkflowSession::from_state(reindexed),
            Err(SessionError::Corrupt(_))
        ));

        let mut spent = s.state().clone();
        spent.max_iterations = 1;
        assert!(matches!(
            WorkflowSession::from_state(spent),
            Err(SessionError::Corrupt(_))
        ));

        let mut wrong_phase = s.state().clone();
        wrong_phase.phase = Phase::Completion;
        assert!(matches!(
            WorkflowSession::from_state(wrong_phase),
            Err(SessionError::Corrupt(_))
        ));

        let mut contradicted = s.state().clone();
        contradicted.history[0].recommendation = Recommendation::Accept;
        contradicted.phase = Phase::Completion;
        assert!(matches!(
            WorkflowSession::from_state(contradicted),
            Err(SessionError::Corrupt(_))
        ));

        let mut renamed = s.state().clone();
        renamed.history[0].gate_results[0].gate = "style".into();
        assert!(matches!(
            WorkflowSession::from_state(renamed),
            Err(SessionError::Corrupt(_))
        ));
    }

    #[test]
    fn from_state_rejects_history_after_terminal_decision() {
        let mut accepted = started(3);
        accepted.record_iteration(metrics(true, true)).unwrap();
        let mut later = started(3);
        later.record_iteration(metrics(false, true)).unwrap();
        later.record_iteration(metrics(false, true)).unwrap();

        // Accept@1 followed by Iterate@2, left in Refinement.
        let mut state = accepted.state().clone();
        let mut second = later.history()[1].clone();
        second.index = 2;
        state.history.push(second);
        state.phase = Phase::Refinement;
        let err = WorkflowSession::from_state(state).unwrap_err();
        assert!(matches!(err, SessionError::Corrupt(_)), "{err}");
    }

    #[test]
    fn transition_table() {
        use Phase::*;
        assert!(is_allowed(Discovery, Development));
        assert!(is_allowed(Refinement, Development));
        assert!(is_allowed(Discovery, Aborted));
        assert!(!is_allowed(Discovery, Refinement));
        assert!(!is_allowed(Refinement, Completion));
        assert!(!is_allowed(Completion, Escalated));
        assert!(!is_allowed(Escalated, Development));
    }
}
