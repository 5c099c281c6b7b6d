use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A percentage constrained to [0.0, 100.0].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percent(f64);

impl Percent {
    pub fn new(v: f64) -> Option<Self> {
        if (0.0..=100.0).contains(&v) {
            Some(Self(v))
        } else {
            None
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

impl Serialize for Percent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Percent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = f64::deserialize(deserializer)?;
        Percent::new(v).ok_or_else(|| serde::de::Error::custom(format!("{v} not in [0, 100]")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CriterionOp {
    /// True for the ordering operators, which only make sense on numbers.
    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// Workflow phase of a session.
///
/// Development and Refinement may cycle; everything else only moves forward.
/// Completion, Escalated and Aborted are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Discovery,
    Development,
    Refinement,
    Completion,
    Escalated,
    Aborted,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completion | Self::Escalated | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Development => "development",
            Self::Refinement => "refinement",
            Self::Completion => "completion",
            Self::Escalated => "escalated",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of judging one iteration against the gates and the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Accept,
    Iterate,
    Escalate,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Iterate => "iterate",
            Self::Escalate => "escalate",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Self::Accept),
            "iterate" => Ok(Self::Iterate),
            "escalate" => Ok(Self::Escalate),
            other => Err(format!("unknown recommendation '{other}'")),
        }
    }
}

/// What caused a phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    Approval,
    Accept,
    Iterate,
    FixRecorded,
    Escalate,
    ExternalEscalation,
    Abort,
}

/// Audit event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    SessionStarted,
    PhaseTransition,
    IterationRecorded,
    Escalation,
    Abort,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionStarted => "SessionStarted",
            Self::PhaseTransition => "PhaseTransition",
            Self::IterationRecorded => "IterationRecorded",
            Self::Escalation => "Escalation",
            Self::Abort => "Abort",
        }
    }
}
