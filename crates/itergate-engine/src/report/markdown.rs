use itergate_core::spec::gates::Gate;
use itergate_core::state::{FeedbackItem, IterationRecord};

use crate::state::session::WorkflowSession;

/// Render a session as a Markdown report for human review.
pub fn render_markdown(session: &WorkflowSession) -> String {
    let mut out = String::with_capacity(2048);
    emit_identity(&mut out, session);
    emit_gates(&mut out, session.gates().gates());
    for record in session.history() {
        emit_iteration(&mut out, record);
    }
    emit_outstanding(&mut out, session);
    out
}

// ── Section emitters ────────────────────────────────────────────

fn emit_identity(out: &mut String, session: &WorkflowSession) {
    out.push_str(&format!("# Session: {}\n\n", session.name()));
    out.push_str(&format!("**Phase:** {}\n", session.phase()));
    out.push_str(&format!(
        "**Iterations:** {}/{}\n",
        session.history().len(),
        session.max_iterations()
    ));
    if let Some(last) = session.latest() {
        out.push_str(&format!("**Last recommendation:** {}\n", last.recommendation));
    }
    out.push('\n');
}

fn emit_gates(out: &mut String, gates: &[Gate]) {
    out.push_str("## Gates\n\n");
    out.push_str("| # | Gate | Criteria | Description |\n");
    out.push_str("|---|------|----------|-------------|\n");
    for (i, gate) in gates.iter().enumerate() {
        let criteria: Vec<String> = gate
            .criteria
            .iter()
            .map(|c| format!("`{} {} {}`", c.metric, c.op.symbol(), c.value))
            .collect();
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            i + 1,
            gate.name,
            criteria.join(", "),
            gate.description
        ));
    }
    out.push('\n');
}

fn emit_iteration(out: &mut String, record: &IterationRecord) {
    out.push_str(&format!(
        "## Iteration {}: {}\n\n",
        record.index, record.recommendation
    ));
    for result in &record.gate_results {
        let mark = if result.pass { "x" } else { " " };
        out.push_str(&format!("- [{mark}] **{}**\n", result.gate));
        for c in &result.criteria {
            let verdict = if c.pass { "ok" } else { "FAIL" };
            out.push_str(&format!(
                "  - {} = {} (want {} {}) {verdict}\n",
                c.metric,
                c.actual,
                c.op.symbol(),
                c.value
            ));
        }
    }
    out.push('\n');
}

fn emit_outstanding(out: &mut String, session: &WorkflowSession) {
    let Some(last) = session.latest() else {
        return;
    };
    if last.feedback.is_empty() {
        return;
    }
    out.push_str("## Outstanding feedback\n\n");
    for item in &last.feedback {
        emit_feedback_item(out, item);
    }
    out.push('\n');
}

fn emit_feedback_item(out: &mut String, item: &FeedbackItem) {
    out.push_str(&format!("{}. **{}**", item.priority, item.gate));
    if !item.description.is_empty() {
        out.push_str(&format!(": {}", item.description));
    }
    out.push('\n');
    let location = item.fix_location.as_deref().unwrap_or("_to be located_");
    out.push_str(&format!("   - Fix location: {location}\n"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::evaluator::QualityGateSet;
    use itergate_core::metrics::{MetricName, Metrics};
    use itergate_core::types::CriterionOp;
    use serde_json::json;

    fn session() -> WorkflowSession {
        let gates = QualityGateSet::new(vec![
            Gate::new("quality", "no critical issues").with(
                MetricName::CriticalIssues,
                CriterionOp::Eq,
                json!(0),
            ),
            Gate::new("testing", "").with(MetricName::ScenariosTested, CriterionOp::Gte, json!(5)),
        ])
        .unwrap();
        let mut s = WorkflowSession::new("login-form", gates, 3).unwrap();
        s.approve("lead").unwrap();
        s
    }

    fn metrics(critical: u32, scenarios: u32) -> Metrics {
        Metrics {
            critical_issues: Some(critical),
            scenarios_tested: Some(scenarios),
            ..Metrics::default()
        }
    }

    #[test]
    fn fresh_session_has_header_and_gate_table() {
        let md = render_markdown(&session());
        assert!(md.starts_with("# Session: login-form\n"));
        assert!(md.contains("**Phase:** development"));
        assert!(md.contains("**Iterations:** 0/3"));
        assert!(md.contains("| 1 | quality | `critical_issues == 0` | no critical issues |"));
        assert!(!md.contains("## Iteration"));
        assert!(!md.contains("Outstanding"));
    }

    #[test]
    fn failing_iteration_lists_outstanding_feedback() {
        let mut s = session();
        s.record_iteration(metrics(2, 7)).unwrap();
        let md = render_markdown(&s);
        assert!(md.contains("## Iteration 1: iterate"));
        assert!(md.contains("- [ ] **quality**"));
        assert!(md.contains("- [x] **testing**"));
        assert!(md.contains("critical_issues = 2 (want == 0) FAIL"));
        assert!(md.contains("1. **quality**: no critical issues\n   - Fix location: _to be located_"));
    }

    #[test]
    fn accepted_session_has_no_outstanding_section() {
        let mut s = session();
        s.record_iteration(metrics(2, 7)).unwrap();
        s.record_iteration(metrics(0, 7)).unwrap();
        let md = render_markdown(&s);
        assert!(md.contains("**Phase:** completion"));
        assert!(md.contains("**Last recommendation:** accept"));
        assert!(!md.contains("Outstanding"));
    }
}
