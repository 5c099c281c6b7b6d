#![forbid(unsafe_code)]

use std::io::{self, Read};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::json;

use itergate_core::metrics::Metrics;
use itergate_core::spec::WorkflowSpec;
use itergate_core::state::GateResult;
use itergate_core::types::{AuditEventType, Phase, Recommendation};
use itergate_engine::config;
use itergate_engine::gates::decision::DecisionEngine;
use itergate_engine::gates::evaluator::QualityGateSet;
use itergate_engine::report::{markdown, text};
use itergate_engine::state::session::WorkflowSession;
use itergate_engine::state::writer::StateWriter;
use itergate_engine::state::{audit_log, store};

#[derive(Parser)]
#[command(
    name = "igate",
    version,
    about = "Bounded-iteration quality gates: evaluate, decide, track. Unix-friendly."
)]
struct Cli {
    /// Debug logging on stderr (overrides RUST_LOG).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List available built-in gate-set templates.
    Templates,

    /// Create a workflow document from a built-in template.
    New {
        /// Template name: standard, minimal, release.
        template: String,

        /// Workflow name.
        #[arg(long)]
        name: Option<String>,

        /// Write to file instead of stdout.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Bootstrap a workflow file or workspace defaults.
    Init {
        /// Initialize workspace defaults (.itergate/defaults.json).
        #[arg(long)]
        workspace: bool,
    },

    /// Validate a workflow document: schema + semantic lint.
    Check {
        /// Path to workflow .json file.
        file: String,

        /// Output structured JSON report.
        #[arg(long)]
        json: bool,

        /// Fail on warnings (not just errors).
        #[arg(long)]
        strict: bool,
    },

    /// Evaluate a workflow's gates against a metrics report.
    Evaluate {
        /// Path to workflow .json file.
        workflow: String,

        /// Metrics JSON file (or "-" for stdin).
        #[arg(long)]
        metrics: String,
    },

    /// Decide accept / iterate / escalate from raw gate results.
    Decide {
        /// Path to workflow .json file.
        workflow: String,

        /// Gate results: JSON array or `gate=<name>: pass|fail` lines ("-" for stdin).
        #[arg(long)]
        results: String,

        /// 1-based index of the iteration being judged.
        #[arg(long)]
        iteration: u32,

        /// Iteration budget (defaults to workflow, then workspace, then 3).
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Start a new session from a workflow document.
    Start {
        /// Path to workflow .json file.
        workflow: String,

        /// Session state file to create.
        #[arg(long)]
        session: String,

        /// Session name (defaults to the workflow name).
        #[arg(long)]
        name: Option<String>,

        /// Iteration budget (defaults to workflow, then workspace, then 3).
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Approve the plan: Discovery to Development.
    Approve {
        /// Session state file.
        session: String,

        /// Who approved.
        #[arg(long, default_value = "cli")]
        approver: String,
    },

    /// Record an iteration's metrics and apply the decision.
    Record {
        /// Session state file.
        session: String,

        /// Metrics JSON file (or "-" for stdin).
        #[arg(long)]
        metrics: String,

        /// Print the full iteration record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Escalate a session to a human.
    Escalate {
        /// Session state file.
        session: String,

        /// Reason for escalation.
        #[arg(long)]
        reason: String,
    },

    /// Abort a session.
    Abort {
        /// Session state file.
        session: String,

        /// Reason for aborting.
        #[arg(long)]
        reason: String,
    },

    /// Show phase, budget, and outstanding feedback.
    Status {
        /// Session state file.
        session: String,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Render the iteration history.
    Report {
        /// Session state file.
        session: String,

        /// Markdown report instead of the text record format.
        #[arg(long)]
        markdown: bool,
    },

    /// Verify or checkpoint the audit log hash-chain.
    Audit {
        /// Session state file.
        session: String,

        /// Verify the hash chain.
        #[arg(long)]
        verify: bool,

        /// Write a checkpoint of the current chain head.
        #[arg(long)]
        checkpoint: Option<String>,

        /// Verify the log against an earlier checkpoint.
        #[arg(long)]
        verify_checkpoint: Option<String>,
    },

    /// Summarize session files in a directory as a table.
    List {
        /// Directory containing .session.json files.
        #[arg(default_value = ".")]
        dir: String,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Cmd::Templates => cmd_templates(),

        Cmd::New {
            template,
            name,
            output,
        } => cmd_new(&template, name.as_deref(), output.as_deref()),

        Cmd::Init { workspace } => cmd_init(workspace),

        Cmd::Check { file, json, strict } => cmd_check(&file, json, strict),

        Cmd::Evaluate { workflow, metrics } => cmd_evaluate(&workflow, &metrics),

        Cmd::Decide {
            workflow,
            results,
            iteration,
            max_iterations,
        } => cmd_decide(&workflow, &results, iteration, max_iterations),

        Cmd::Start {
            workflow,
            session,
            name,
            max_iterations,
        } => cmd_start(&workflow, &session, name.as_deref(), max_iterations),

        Cmd::Approve { session, approver } => cmd_approve(&session, &approver),

        Cmd::Record {
            session,
            metrics,
            json,
        } => cmd_record(&session, &metrics, json),

        Cmd::Escalate { session, reason } => cmd_escalate(&session, &reason),

        Cmd::Abort { session, reason } => cmd_abort(&session, &reason),

        Cmd::Status { session, json } => cmd_status(&session, json),

        Cmd::Report { session, markdown } => cmd_report(&session, markdown),

        Cmd::Audit {
            session,
            verify,
            checkpoint,
            verify_checkpoint,
        } => cmd_audit(
            &session,
            verify,
            checkpoint.as_deref(),
            verify_checkpoint.as_deref(),
        ),

        Cmd::List { dir } => cmd_list(&dir),
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose > 0 {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Exit status for a recommendation: 0 accept, 2 iterate, 3 escalate.
fn exit_for(recommendation: Recommendation) -> ExitCode {
    match recommendation {
        Recommendation::Accept => ExitCode::SUCCESS,
        Recommendation::Iterate => ExitCode::from(2),
        Recommendation::Escalate => ExitCode::from(3),
    }
}

// ── Input helpers ───────────────────────────────────────────────

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("cannot read {path}"))
    }
}

fn read_metrics(path: &str) -> Result<Metrics> {
    let content = read_input(path)?;
    serde_json::from_str(&content).with_context(|| format!("{path}: invalid metrics JSON"))
}

/// Gate results as a JSON array, or as `gate=<name>: pass|fail` lines.
fn read_gate_results(path: &str) -> Result<Vec<GateResult>> {
    let content = read_input(path)?;
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(&content)
            .with_context(|| format!("{path}: invalid gate results JSON"));
    }
    text::parse_gate_results(&content).with_context(|| format!("{path}: invalid gate results"))
}

fn load_gate_set(spec: &WorkflowSpec, path: &str) -> Result<QualityGateSet> {
    QualityGateSet::new(spec.gates.clone()).with_context(|| format!("{path}: invalid gate table"))
}

fn workspace_defaults() -> Option<config::WorkspaceDefaults> {
    config::load_workspace_defaults(Path::new("."))
}

/// Lock the session, apply a mutation, audit what changed, write it back.
fn mutate_session<T>(
    path: &str,
    apply: impl FnOnce(&mut WorkflowSession) -> Result<T>,
) -> Result<(T, WorkflowSession)> {
    let writer = StateWriter::acquire(path)?;
    let mut session = store::load_session(path)?;
    let seen_iterations = session.history().len();
    let seen_transitions = session.transitions().len();

    let value = apply(&mut session)?;

    let audit = session.audit_config();
    for record in &session.history()[seen_iterations..] {
        writer.maybe_audit(
            audit,
            AuditEventType::IterationRecorded,
            &json!({
                "session": session.name(),
                "iteration": record.index,
                "gate_results": record.gate_results,
                "recommendation": record.recommendation,
                "feedback": record.feedback,
                "metrics_hash": record.metrics_hash,
            }),
        )?;
    }
    for t in &session.transitions()[seen_transitions..] {
        let event = match t.to {
            Phase::Escalated => AuditEventType::Escalation,
            Phase::Aborted => AuditEventType::Abort,
            _ => AuditEventType::PhaseTransition,
        };
        writer.maybe_audit(
            audit,
            event,
            &json!({
                "session": session.name(),
                "from": t.from,
                "to": t.to,
                "trigger": t.trigger,
                "iteration": t.iteration,
                "reason": t.reason,
                "state_rev": t.state_rev,
            }),
        )?;
    }

    writer.write_state(session.state())?;
    tracing::debug!(
        session = path,
        state_rev = session.state().state_rev,
        "session written"
    );
    Ok((value, session))
}

// ── Workflow documents ──────────────────────────────────────────

fn cmd_templates() -> Result<ExitCode> {
    for (name, desc) in itergate_core::templates::list_templates() {
        println!("  {name:<12} {desc}");
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_new(template: &str, name: Option<&str>, output: Option<&str>) -> Result<ExitCode> {
    let spec = itergate_core::templates::generate(template, name).ok_or_else(|| {
        let available: Vec<_> = itergate_core::templates::list_templates()
            .iter()
            .map(|(n, _)| *n)
            .collect();
        anyhow!(
            "unknown template \"{template}\". available: {}",
            available.join(", ")
        )
    })?;

    let json = serde_json::to_string_pretty(&spec)?;

    if let Some(path) = output {
        std::fs::write(path, &json).with_context(|| format!("cannot write {path}"))?;
        eprintln!("wrote {path}");
    } else {
        println!("{json}");
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_init(workspace: bool) -> Result<ExitCode> {
    if workspace {
        let dir = Path::new(config::DEFAULTS_DIR);
        std::fs::create_dir_all(dir)?;
        let defaults = config::WorkspaceDefaults {
            max_iterations: Some(config::DEFAULT_MAX_ITERATIONS),
        };
        let path = dir.join(config::DEFAULTS_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(&defaults)?)?;
        eprintln!("created {}", path.display());
    } else {
        let path = "workflow.json";
        if Path::new(path).exists() {
            bail!("{path} already exists");
        }
        let spec = itergate_core::templates::generate("standard", None)
            .ok_or_else(|| anyhow!("standard template missing"))?;
        std::fs::write(path, serde_json::to_string_pretty(&spec)?)?;
        eprintln!("created {path} (edit to customize)");
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(file: &str, json_out: bool, strict: bool) -> Result<ExitCode> {
    let content = std::fs::read_to_string(file).with_context(|| format!("cannot read {file}"))?;
    let data: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("{file}: invalid JSON"))?;

    let report = itergate_core::schema::check(&data, file, strict);

    if json_out {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if report.pass {
            eprintln!("  ok  {file} (v{})", report.version);
        } else {
            eprintln!("  FAIL {file} (v{})", report.version);
        }
        for e in &report.errors {
            eprintln!(
                "  error {}: {} {}",
                e.code,
                e.message,
                e.path.as_deref().unwrap_or("")
            );
        }
        for w in &report.warnings {
            eprintln!(
                "  warn  {}: {} {}",
                w.code,
                w.message,
                w.path.as_deref().unwrap_or("")
            );
        }
    }

    if !report.pass {
        bail!("check failed for {file}");
    }
    Ok(ExitCode::SUCCESS)
}

// ── Stateless evaluation ────────────────────────────────────────

fn cmd_evaluate(workflow: &str, metrics_path: &str) -> Result<ExitCode> {
    let spec = WorkflowSpec::load(workflow)?;
    let gates = load_gate_set(&spec, workflow)?;
    let metrics = read_metrics(metrics_path)?;

    let results = gates.evaluate(&metrics)?;
    for r in &results {
        eprintln!("  {:<4} {}", if r.pass { "pass" } else { "FAIL" }, r.gate);
    }
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_decide(
    workflow: &str,
    results_path: &str,
    iteration: u32,
    max_iterations: Option<u32>,
) -> Result<ExitCode> {
    let spec = WorkflowSpec::load(workflow)?;
    let gates = load_gate_set(&spec, workflow)?;
    let results = read_gate_results(results_path)?;
    let budget = config::resolve_max_iterations(
        max_iterations,
        Some(&spec),
        workspace_defaults().as_ref(),
    );

    let decision = DecisionEngine.decide(&gates, &results, iteration, budget)?;
    eprintln!(
        "  iteration {iteration}/{budget}: {}",
        decision.recommendation
    );
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(exit_for(decision.recommendation))
}

// ── Sessions ────────────────────────────────────────────────────

fn cmd_start(
    workflow: &str,
    session_path: &str,
    name: Option<&str>,
    max_iterations: Option<u32>,
) -> Result<ExitCode> {
    if Path::new(session_path).exists() {
        bail!("session {session_path} already exists");
    }
    let spec = WorkflowSpec::load(workflow)?;
    let gates = load_gate_set(&spec, workflow)?;
    let budget = config::resolve_max_iterations(
        max_iterations,
        Some(&spec),
        workspace_defaults().as_ref(),
    );
    let name = name
        .map(str::to_string)
        .or_else(|| spec.name.clone())
        .unwrap_or_else(|| session_stem(session_path));

    let writer = StateWriter::acquire(session_path)?;
    if Path::new(session_path).exists() {
        bail!("session {session_path} already exists");
    }
    let session = WorkflowSession::new(name, gates, budget)?.with_audit(spec.audit.clone());
    writer.maybe_audit(
        session.audit_config(),
        AuditEventType::SessionStarted,
        &json!({
            "session": session.name(),
            "workflow": workflow,
            "gates": session.gates().names().collect::<Vec<_>>(),
            "max_iterations": budget,
        }),
    )?;
    writer.write_state(session.state())?;

    eprintln!(
        "  started {} ({} gates, budget {budget}) in {}",
        session.name(),
        session.gates().len(),
        session.phase()
    );
    Ok(ExitCode::SUCCESS)
}

fn session_stem(path: &str) -> String {
    let file = Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    match file.strip_suffix(itergate_core::list::SESSION_SUFFIX) {
        Some(stem) => stem.to_string(),
        None => file,
    }
}

fn cmd_approve(session_path: &str, approver: &str) -> Result<ExitCode> {
    let (_, session) = mutate_session(session_path, |s| {
        s.approve(approver)?;
        Ok(())
    })?;
    eprintln!("  {}: approved by {approver}, now {}", session.name(), session.phase());
    Ok(ExitCode::SUCCESS)
}

fn cmd_record(session_path: &str, metrics_path: &str, json_out: bool) -> Result<ExitCode> {
    let metrics = read_metrics(metrics_path)?;
    let (_, session) = mutate_session(session_path, |s| {
        s.record_iteration(metrics)?;
        Ok(())
    })?;
    let record = session
        .latest()
        .ok_or_else(|| anyhow!("no iteration recorded"))?;

    if json_out {
        println!("{}", serde_json::to_string_pretty(record)?);
    } else {
        print!("{}", text::render_iteration(record));
    }
    eprintln!(
        "  {}: iteration {}/{} -> {}",
        session.name(),
        record.index,
        session.max_iterations(),
        session.phase()
    );
    Ok(exit_for(record.recommendation))
}

fn cmd_escalate(session_path: &str, reason: &str) -> Result<ExitCode> {
    let (_, session) = mutate_session(session_path, |s| {
        s.escalate(reason)?;
        Ok(())
    })?;
    eprintln!("  {}: escalated ({reason})", session.name());
    Ok(ExitCode::SUCCESS)
}

fn cmd_abort(session_path: &str, reason: &str) -> Result<ExitCode> {
    let (_, session) = mutate_session(session_path, |s| {
        s.abort(reason)?;
        Ok(())
    })?;
    eprintln!("  {}: aborted ({reason})", session.name());
    Ok(ExitCode::SUCCESS)
}

fn cmd_status(session_path: &str, json_out: bool) -> Result<ExitCode> {
    let session = store::load_session(session_path)?;
    let last = session.latest();
    let feedback: Vec<&str> = last
        .map(|r| r.feedback.iter().map(|f| f.gate.as_str()).collect())
        .unwrap_or_default();

    if json_out {
        let status = json!({
            "name": session.name(),
            "phase": session.phase(),
            "iterations": session.history().len(),
            "max_iterations": session.max_iterations(),
            "remaining": session.remaining_iterations(),
            "last_recommendation": last.map(|r| r.recommendation),
            "feedback": feedback,
            "state_rev": session.state().state_rev,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("  name:       {}", session.name());
        println!("  phase:      {}", session.phase());
        println!(
            "  iterations: {}/{} ({} remaining)",
            session.history().len(),
            session.max_iterations(),
            session.remaining_iterations()
        );
        if let Some(r) = last {
            println!("  last:       {}", r.recommendation);
        }
        if !feedback.is_empty() {
            println!("  feedback:   {}", feedback.join(", "));
        }
        println!("  state_rev:  {}", session.state().state_rev);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_report(session_path: &str, as_markdown: bool) -> Result<ExitCode> {
    let session = store::load_session(session_path)?;
    if as_markdown {
        print!("{}", markdown::render_markdown(&session));
    } else {
        print!("{}", text::render_report(session.history()));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_audit(
    session_path: &str,
    verify: bool,
    checkpoint: Option<&str>,
    verify_checkpoint: Option<&str>,
) -> Result<ExitCode> {
    if !verify && checkpoint.is_none() && verify_checkpoint.is_none() {
        bail!("specify --verify, --checkpoint or --verify-checkpoint");
    }
    let audit_path = store::audit_path_for(session_path);
    // Every session logs SessionStarted, so an absent log has been removed.
    if !Path::new(&audit_path).exists() {
        bail!("no audit log found at {audit_path}");
    }

    if verify {
        let count = audit_log::verify_chain(&audit_path)?;
        eprintln!("  audit chain valid ({count} entries)");
    }
    if let Some(cp) = checkpoint {
        let written = audit_log::create_checkpoint(&audit_path, cp)?;
        eprintln!("  checkpoint written to {cp} ({} entries)", written["entries"]);
    }
    if let Some(cp) = verify_checkpoint {
        if !audit_log::verify_checkpoint(&audit_path, cp)? {
            bail!("audit log does not match checkpoint {cp}");
        }
        eprintln!("  audit log matches checkpoint {cp}");
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_list(dir: &str) -> Result<ExitCode> {
    let rows = itergate_core::list::scan_dir(dir)?;
    itergate_core::list::print_table(&rows);
    Ok(ExitCode::SUCCESS)
}
