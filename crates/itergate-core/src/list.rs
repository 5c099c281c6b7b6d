use std::path::Path;

use anyhow::{Context, Result};

use crate::state::SessionState;

pub const SESSION_SUFFIX: &str = ".session.json";

/// Summary row for a single session file.
pub struct SessionRow {
    pub file: String,
    pub name: String,
    pub phase: String,
    pub iterations: String,
    pub last: String,
}

/// Scan a directory for session files and produce summary rows.
pub fn scan_dir(dir: &str) -> Result<Vec<SessionRow>> {
    let mut rows = Vec::new();
    let entries = std::fs::read_dir(dir).with_context(|| format!("cannot read directory {dir}"))?;

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(SESSION_SUFFIX))
        .map(|e| e.path())
        .collect();
    paths.sort();

    for path in paths {
        match load_row(&path) {
            Ok(row) => rows.push(row),
            Err(e) => {
                eprintln!("  skip {}: {e:#}", path.display());
            }
        }
    }
    Ok(rows)
}

fn load_row(path: &Path) -> Result<SessionRow> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let state: SessionState = serde_json::from_str(&content)
        .with_context(|| format!("{}: invalid session JSON", path.display()))?;

    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    let last = state
        .history
        .last()
        .map(|r| r.recommendation.to_string())
        .unwrap_or_else(|| "-".to_string());

    Ok(SessionRow {
        file,
        name: state.name,
        phase: state.phase.to_string(),
        iterations: format!("{}/{}", state.history.len(), state.max_iterations),
        last,
    })
}

/// Print rows as an aligned table to stdout.
pub fn print_table(rows: &[SessionRow]) {
    if rows.is_empty() {
        println!("(no sessions found)");
        return;
    }
    let w_file = rows.iter().map(|r| r.file.len()).max().unwrap_or(4).max(4);
    let w_name = rows.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);

    println!(
        "{:<w_file$}  {:<w_name$}  {:<11}  {:<5}  LAST",
        "FILE", "NAME", "PHASE", "ITER"
    );
    println!(
        "{:<w_file$}  {:<w_name$}  {:<11}  {:<5}  ----",
        "-".repeat(w_file),
        "-".repeat(w_name),
        "-----------",
        "-----"
    );
    for r in rows {
        println!(
            "{:<w_file$}  {:<w_name$}  {:<11}  {:<5}  {}",
            r.file, r.name, r.phase, r.iterations, r.last
        );
    }
}
