use std::path::Path;

use itergate_core::spec::WorkflowSpec;
use serde::{Deserialize, Serialize};

/// Iteration budget used when nothing else sets one.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Workspace-level defaults, read from `.itergate/defaults.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

pub const DEFAULTS_DIR: &str = ".itergate";
pub const DEFAULTS_FILE: &str = "defaults.json";

/// Load workspace defaults below `dir`. A missing or unreadable file yields
/// `None`; a malformed one is logged and ignored.
pub fn load_workspace_defaults(dir: &Path) -> Option<WorkspaceDefaults> {
    let path = dir.join(DEFAULTS_DIR).join(DEFAULTS_FILE);
    let content = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(defaults) => Some(defaults),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed workspace defaults");
            None
        }
    }
}

/// Resolve the iteration budget.
///
/// Precedence (highest to lowest):
/// 1. Explicit flag
/// 2. Workflow document
/// 3. Workspace defaults
/// 4. `DEFAULT_MAX_ITERATIONS`
///
/// A zero at any layer is skipped rather than accepted.
pub fn resolve_max_iterations(
    flag: Option<u32>,
    spec: Option<&WorkflowSpec>,
    defaults: Option<&WorkspaceDefaults>,
) -> u32 {
    [
        flag,
        spec.and_then(|s| s.max_iterations),
        defaults.and_then(|d| d.max_iterations),
    ]
    .into_iter()
    .flatten()
    .find(|n| *n > 0)
    .unwrap_or(DEFAULT_MAX_ITERATIONS)
}
