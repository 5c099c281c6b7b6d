use serde_json::json;

use crate::metrics::MetricName;
use crate::spec::gates::Gate;
use crate::spec::{WorkflowSpec, SCHEMA_URI};
use crate::types::CriterionOp;

/// Built-in gate sets.
pub fn list_templates() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "standard",
            "code-quality, testing, integration, documentation; 3 iterations",
        ),
        ("minimal", "quality and testing only; 3 iterations"),
        (
            "release",
            "standard gates with release thresholds; 2 iterations",
        ),
    ]
}

pub fn generate(template: &str, name: Option<&str>) -> Option<WorkflowSpec> {
    let (gates, max_iterations) = match template {
        "standard" => (standard_gates(85.0, 5), 3),
        "minimal" => (minimal_gates(), 3),
        "release" => (standard_gates(95.0, 10), 2),
        _ => return None,
    };
    Some(WorkflowSpec {
        schema_uri: Some(SCHEMA_URI.to_string()),
        version: Some("1.0".to_string()),
        name: Some(name.unwrap_or(template).to_string()),
        max_iterations: Some(max_iterations),
        gates,
        audit: None,
    })
}

fn standard_gates(compliance: f64, scenarios: u32) -> Vec<Gate> {
    vec![
        Gate::new(
            "code-quality",
            "No critical review issues and style compliance at threshold",
        )
        .with(MetricName::CriticalIssues, CriterionOp::Eq, json!(0))
        .with(MetricName::CompliancePct, CriterionOp::Gte, json!(compliance)),
        Gate::new(
            "testing",
            "Enough scenarios exercised with no runtime errors",
        )
        .with(MetricName::ScenariosTested, CriterionOp::Gte, json!(scenarios))
        .with(MetricName::RuntimeErrors, CriterionOp::Eq, json!(0)),
        Gate::new("integration", "No breaking changes to existing callers").with(
            MetricName::BreakingChanges,
            CriterionOp::Eq,
            json!(false),
        ),
        Gate::new("documentation", "Public API documented").with(
            MetricName::DocsComplete,
            CriterionOp::Eq,
            json!(true),
        ),
    ]
}

fn minimal_gates() -> Vec<Gate> {
    vec![
        Gate::new("quality", "No critical review issues")
            .with(MetricName::CriticalIssues, CriterionOp::Eq, json!(0)),
        Gate::new("testing", "Scenarios exercised with no runtime errors")
            .with(MetricName::ScenariosTested, CriterionOp::Gte, json!(1))
            .with(MetricName::RuntimeErrors, CriterionOp::Eq, json!(0)),
    ]
}
