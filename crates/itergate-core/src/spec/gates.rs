use serde::{Deserialize, Serialize};

use crate::metrics::MetricName;
use crate::types::CriterionOp;

/// A named pass/fail criterion set evaluated against iteration metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub criteria: Vec<Criterion>,
}

impl Gate {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            criteria: Vec::new(),
        }
    }

    /// Builder-style helper used by templates and tests.
    pub fn with(mut self, metric: MetricName, op: CriterionOp, value: serde_json::Value) -> Self {
        self.criteria.push(Criterion { metric, op, value });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub metric: MetricName,
    pub op: CriterionOp,
    pub value: serde_json::Value,
}
