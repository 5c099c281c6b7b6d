use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub log_transitions: bool,

    #[serde(default = "default_true")]
    pub log_iterations: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_transitions: true,
            log_iterations: true,
        }
    }
}

fn default_true() -> bool {
    true
}
