//! Line-oriented text form of judged iterations.
//!
//! ```text
//! iteration: 1
//! gate=quality: fail
//! gate=testing: pass
//! recommendation: iterate
//! feedback: quality
//! ```
//!
//! A session history is a sequence of such blocks separated by one blank line.

use itergate_core::errors::ReportParseError;
use itergate_core::state::{GateResult, IterationRecord};
use itergate_core::types::Recommendation;
use serde::Serialize;

/// What the text form carries of one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationSummary {
    pub index: u32,
    pub gates: Vec<(String, bool)>,
    pub recommendation: Recommendation,
    pub feedback: Vec<String>,
}

impl IterationSummary {
    pub fn gate_results(&self) -> Vec<GateResult> {
        self.gates
            .iter()
            .map(|(name, pass)| GateResult::bare(name.as_str(), *pass))
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = format!("iteration: {}\n", self.index);
        for (name, pass) in &self.gates {
            out.push_str(&format!("gate={name}: {}\n", outcome(*pass)));
        }
        out.push_str(&format!("recommendation: {}\n", self.recommendation));
        if self.feedback.is_empty() {
            out.push_str("feedback:\n");
        } else {
            out.push_str(&format!("feedback: {}\n", self.feedback.join(", ")));
        }
        out
    }
}

impl From<&IterationRecord> for IterationSummary {
    fn from(record: &IterationRecord) -> Self {
        Self {
            index: record.index,
            gates: record
                .gate_results
                .iter()
                .map(|r| (r.gate.clone(), r.pass))
                .collect(),
            recommendation: record.recommendation,
            feedback: record.feedback.iter().map(|f| f.gate.clone()).collect(),
        }
    }
}

fn outcome(pass: bool) -> &'static str {
    if pass {
        "pass"
    } else {
        "fail"
    }
}

pub fn render_iteration(record: &IterationRecord) -> String {
    IterationSummary::from(record).render()
}

pub fn render_report(history: &[IterationRecord]) -> String {
    history
        .iter()
        .map(render_iteration)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse exactly one iteration block.
pub fn parse_iteration(text: &str) -> Result<IterationSummary, ReportParseError> {
    let blocks = split_blocks(text);
    match blocks.as_slice() {
        [] => Err(ReportParseError::MissingField("iteration")),
        [only] => parse_block(only),
        [_, second, ..] => {
            let (line, content) = second[0];
            Err(invalid_line(line, content))
        }
    }
}

/// Parse every block of a rendered history, in order.
pub fn parse_report(text: &str) -> Result<Vec<IterationSummary>, ReportParseError> {
    split_blocks(text).iter().map(|b| parse_block(b)).collect()
}

/// Read only the `gate=` lines, ignoring everything else.
pub fn parse_gate_results(text: &str) -> Result<Vec<GateResult>, ReportParseError> {
    let mut results = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("gate=") {
            let (name, pass) = parse_gate(i + 1, line, rest)?;
            results.push(GateResult::bare(name, pass));
        }
    }
    if results.is_empty() {
        return Err(ReportParseError::MissingField("gate"));
    }
    Ok(results)
}

type Line<'a> = (usize, &'a str);

fn split_blocks(text: &str) -> Vec<Vec<Line<'_>>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push((i + 1, line));
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_block(lines: &[Line<'_>]) -> Result<IterationSummary, ReportParseError> {
    let mut iter = lines.iter().copied().peekable();

    let (n, line) = iter
        .next()
        .ok_or(ReportParseError::MissingField("iteration"))?;
    let raw = field(line, "iteration").ok_or_else(|| invalid_line(n, line))?;
    let index = raw
        .parse::<u32>()
        .ok()
        .filter(|i| *i > 0)
        .ok_or_else(|| invalid_value("iteration", raw))?;

    let mut gates = Vec::new();
    while let Some((n, line)) = iter.peek().copied() {
        let Some(rest) = line.strip_prefix("gate=") else {
            break;
        };
        iter.next();
        gates.push(parse_gate(n, line, rest)?);
    }

    let (n, line) = iter
        .next()
        .ok_or(ReportParseError::MissingField("recommendation"))?;
    let raw = field(line, "recommendation").ok_or_else(|| invalid_line(n, line))?;
    let recommendation = raw
        .parse::<Recommendation>()
        .map_err(|_| invalid_value("recommendation", raw))?;

    let (n, line) = iter
        .next()
        .ok_or(ReportParseError::MissingField("feedback"))?;
    let raw = field(line, "feedback").ok_or_else(|| invalid_line(n, line))?;
    let feedback = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if let Some((n, line)) = iter.next() {
        return Err(invalid_line(n, line));
    }

    Ok(IterationSummary {
        index,
        gates,
        recommendation,
        feedback,
    })
}

fn parse_gate(n: usize, line: &str, rest: &str) -> Result<(String, bool), ReportParseError> {
    let (name, value) = rest.split_once(':').ok_or_else(|| invalid_line(n, line))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid_line(n, line));
    }
    let pass = match value.trim() {
        "pass" => true,
        "fail" => false,
        other => return Err(invalid_value("gate outcome", other)),
    };
    Ok((name.to_string(), pass))
}

fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix(key)?.strip_prefix(':').map(str::trim)
}

fn invalid_line(line: usize, content: &str) -> ReportParseError {
    ReportParseError::InvalidLine {
        line,
        content: content.to_string(),
    }
}

fn invalid_value(field: &'static str, value: &str) -> ReportParseError {
    ReportParseError::InvalidValue {
        field,
        value: value.to_string(),
    }
}
