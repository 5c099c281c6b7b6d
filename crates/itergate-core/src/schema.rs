use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use jsonschema::Validator;
use serde_json::Value;

use crate::errors::{CheckIssue, CheckReport};
use crate::metrics::MetricName;

const SCHEMA_V10: &str = include_str!("../schema/workflow-v1.0.schema.json");

/// Detect the version of a workflow JSON value.
pub fn detect_version(data: &Value) -> &'static str {
    match data.get("version").and_then(Value::as_str) {
        Some("1.0") | None => "1.0",
        Some(_) => "unknown",
    }
}

/// Create a validator for the embedded workflow schema.
pub fn validator() -> Result<Validator> {
    let schema: Value =
        serde_json::from_str(SCHEMA_V10).context("embedded schema is invalid JSON")?;
    Validator::new(&schema).map_err(|e| anyhow::anyhow!("schema compilation failed: {e}"))
}

/// Validate a single workflow value against the schema.
pub fn validate(data: &Value) -> Result<()> {
    let v = validator()?;
    if v.is_valid(data) {
        return Ok(());
    }
    let mut msgs: Vec<String> = Vec::new();
    for error in v.iter_errors(data) {
        let path = error.instance_path.to_string();
        let loc = if path.is_empty() {
            "(root)".into()
        } else {
            path
        };
        msgs.push(format!("  {loc}: {error}"));
    }
    bail!("validation failed:\n{}", msgs.join("\n"));
}

/// Full check producing structured report (for `igate check --json`).
pub fn check(data: &Value, file: &str, strict: bool) -> CheckReport {
    let version = detect_version(data).to_string();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if let Ok(v) = validator() {
        for error in v.iter_errors(data) {
            let path = error.instance_path.to_string();
            errors.push(CheckIssue {
                code: "E001".to_string(),
                check: "schema".to_string(),
                message: error.to_string(),
                path: Some(if path.is_empty() {
                    "$(root)".to_string()
                } else {
                    format!("${path}")
                }),
            });
        }
    }

    check_gate_table(data, &mut errors);
    lint_checks(data, &mut warnings);

    let pass = errors.is_empty() && (!strict || warnings.is_empty());
    CheckReport {
        file: file.to_string(),
        version,
        pass,
        errors,
        warnings,
    }
}

fn gates(data: &Value) -> &[Value] {
    data.get("gates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn check_gate_table(data: &Value, errors: &mut Vec<CheckIssue>) {
    let mut seen = HashSet::new();
    for (i, gate) in gates(data).iter().enumerate() {
        if let Some(name) = gate.get("name").and_then(Value::as_str) {
            if !seen.insert(name) {
                errors.push(CheckIssue {
                    code: "E002".to_string(),
                    check: "gates".to_string(),
                    message: format!("duplicate gate name '{name}'"),
                    path: Some(format!("$.gates[{i}].name")),
                });
            }
        }
        let has_criteria = gate
            .get("criteria")
            .and_then(Value::as_array)
            .is_some_and(|c| !c.is_empty());
        if !has_criteria {
            errors.push(CheckIssue {
                code: "E003".to_string(),
                check: "gates".to_string(),
                message: "gate has no criteria".to_string(),
                path: Some(format!("$.gates[{i}].criteria")),
            });
        }
    }
}

fn lint_checks(data: &Value, warnings: &mut Vec<CheckIssue>) {
    // W004: no budget in the document
    if data.get("max_iterations").is_none() {
        warnings.push(CheckIssue {
            code: "W004".to_string(),
            check: "lint".to_string(),
            message: "no max_iterations; workspace or built-in default applies".to_string(),
            path: Some("$.max_iterations".to_string()),
        });
    }

    for (i, gate) in gates(data).iter().enumerate() {
        // W001: gate without description
        let described = gate
            .get("description")
            .and_then(Value::as_str)
            .is_some_and(|d| !d.trim().is_empty());
        if !described {
            warnings.push(CheckIssue {
                code: "W001".to_string(),
                check: "lint".to_string(),
                message: "gate without description".to_string(),
                path: Some(format!("$.gates[{i}].description")),
            });
        }

        let Some(criteria) = gate.get("criteria").and_then(Value::as_array) else {
            continue;
        };
        for (j, criterion) in criteria.iter().enumerate() {
            let metric = criterion
                .get("metric")
                .and_then(Value::as_str)
                .and_then(|m| m.parse::<MetricName>().ok());
            let op = criterion.get("op").and_then(Value::as_str);
            let path = format!("$.gates[{i}].criteria[{j}]");

            // W002: compliance threshold that no report can reach or miss
            if metric == Some(MetricName::CompliancePct) {
                if let Some(v) = criterion.get("value").and_then(Value::as_f64) {
                    if !(0.0..=100.0).contains(&v) {
                        warnings.push(CheckIssue {
                            code: "W002".to_string(),
                            check: "lint".to_string(),
                            message: format!("compliance_pct threshold {v} outside [0, 100]"),
                            path: Some(format!("{path}.value")),
                        });
                    }
                }
            }

            // W003: ordering comparison on a boolean metric never passes
            if metric.is_some_and(MetricName::is_boolean)
                && matches!(op, Some("gt" | "gte" | "lt" | "lte"))
            {
                warnings.push(CheckIssue {
                    code: "W003".to_string(),
                    check: "lint".to_string(),
                    message: "ordering comparison on a boolean metric".to_string(),
                    path: Some(format!("{path}.op")),
                });
            }
        }
    }
}
