pub mod audit;
pub mod gates;

use serde::{Deserialize, Serialize};

use self::audit::AuditConfig;
use self::gates::Gate;

pub const SCHEMA_URI: &str = "https://itergate.dev/schema/v1.0/workflow.schema.json";

/// Top-level workflow document (v1.0): the gate table and iteration budget
/// a session is started from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    pub gates: Vec<Gate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditConfig>,
}

impl WorkflowSpec {
    /// Detect version: documents without a version field are treated as "1.0".
    pub fn detected_version(&self) -> &str {
        self.version.as_deref().unwrap_or("1.0")
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content =
            std::fs::read_to_string(path).with_context(|| format!("cannot read {path}"))?;
        serde_json::from_str(&content).with_context(|| format!("{path}: invalid workflow JSON"))
    }
}
