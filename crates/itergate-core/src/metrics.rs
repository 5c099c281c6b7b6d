use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::MetricError;
use crate::types::Percent;

/// Names of the metrics a developer attempt reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    CriticalIssues,
    CompliancePct,
    ScenariosTested,
    RuntimeErrors,
    BreakingChanges,
    DocsComplete,
}

impl MetricName {
    pub const ALL: [MetricName; 6] = [
        MetricName::CriticalIssues,
        MetricName::CompliancePct,
        MetricName::ScenariosTested,
        MetricName::RuntimeErrors,
        MetricName::BreakingChanges,
        MetricName::DocsComplete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CriticalIssues => "critical_issues",
            Self::CompliancePct => "compliance_pct",
            Self::ScenariosTested => "scenarios_tested",
            Self::RuntimeErrors => "runtime_errors",
            Self::BreakingChanges => "breaking_changes",
            Self::DocsComplete => "docs_complete",
        }
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, Self::BreakingChanges | Self::DocsComplete)
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricName::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}

/// Metrics reported by one developer attempt.
///
/// Every field is optional on the wire; a gate that needs an absent field
/// fails evaluation with [`MetricError::Missing`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_issues: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_pct: Option<Percent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios_tested: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_errors: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking_changes: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_complete: Option<bool>,
}

impl Metrics {
    /// Look up a metric as a JSON value, `None` when the report omits it.
    pub fn get(&self, name: MetricName) -> Option<Value> {
        match name {
            MetricName::CriticalIssues => self.critical_issues.map(Value::from),
            MetricName::CompliancePct => self.compliance_pct.map(|p| Value::from(p.value())),
            MetricName::ScenariosTested => self.scenarios_tested.map(Value::from),
            MetricName::RuntimeErrors => self.runtime_errors.map(Value::from),
            MetricName::BreakingChanges => self.breaking_changes.map(Value::from),
            MetricName::DocsComplete => self.docs_complete.map(Value::from),
        }
    }

    pub fn require(&self, name: MetricName) -> Result<Value, MetricError> {
        self.get(name).ok_or(MetricError::Missing(name))
    }

    /// Names of the metrics present in this report, in canonical order.
    pub fn present(&self) -> Vec<MetricName> {
        MetricName::ALL
            .into_iter()
            .filter(|m| self.get(*m).is_some())
            .collect()
    }
}
