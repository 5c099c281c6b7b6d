//! Session lifecycle through the CLI: start, approve, record, escalate, abort.

use test_helpers::{
    audit_entries, igate_json, igate_run, igate_run_stdin, igate_stdout, temp_path,
};

const MINIMAL: &str = "demos/minimal.workflow.json";
const ONE_SHOT: &str = "demos/one-shot.workflow.json";
const FAILING: &str = "demos/metrics/quality-failing.json";
const PASSING: &str = "demos/metrics/all-passing.json";

fn started(dir: &tempfile::TempDir, workflow: &str) -> String {
    let session = temp_path(dir.path(), "demo.session.json");
    igate_run(&["start", workflow, "--session", &session], 0);
    igate_run(&["approve", &session, "--approver", "lead"], 0);
    session
}

// ── Iterate then accept ─────────────────────────────────────────

#[test]
fn iterate_then_accept() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);

    let out = igate_run(&["record", &session, "--metrics", FAILING], 2);
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "iteration: 1\ngate=quality: fail\ngate=testing: pass\nrecommendation: iterate\nfeedback: quality\n"
    );

    let status = igate_json(&["status", &session, "--json"], 0);
    assert_eq!(status["phase"], "refinement");
    assert_eq!(status["feedback"], serde_json::json!(["quality"]));

    let out = igate_run(&["record", &session, "--metrics", PASSING], 0);
    assert!(String::from_utf8_lossy(&out.stdout).contains("recommendation: accept\nfeedback:\n"));

    let status = igate_json(&["status", &session, "--json"], 0);
    assert_eq!(status["phase"], "completion");
    assert_eq!(status["iterations"], 2);
    assert_eq!(status["remaining"], 1);
    assert_eq!(status["last_recommendation"], "accept");
    assert_eq!(status["state_rev"], 4);
}

#[test]
fn one_iteration_budget_escalates_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, ONE_SHOT);

    let out = igate_run(&["record", &session, "--metrics", FAILING], 3);
    assert!(String::from_utf8_lossy(&out.stdout).contains("recommendation: escalate"));

    let status = igate_json(&["status", &session, "--json"], 0);
    assert_eq!(status["phase"], "escalated");

    // Terminal: nothing more can be recorded.
    igate_run(&["record", &session, "--metrics", PASSING], 1);
}

#[test]
fn budget_flag_overrides_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let session = temp_path(dir.path(), "tight.session.json");
    igate_run(
        &["start", MINIMAL, "--session", &session, "--max-iterations", "1"],
        0,
    );
    igate_run(&["approve", &session], 0);
    igate_run(&["record", &session, "--metrics", FAILING], 3);
}

#[test]
fn record_json_includes_criteria_detail() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    let record = igate_json(&["record", &session, "--metrics", FAILING, "--json"], 2);
    assert_eq!(record["index"], 1);
    assert_eq!(record["gate_results"][0]["gate"], "quality");
    assert_eq!(record["gate_results"][0]["criteria"][0]["actual"], 2);
    assert_eq!(record["feedback"][0]["priority"], 1);
    assert!(record["metrics_hash"]
        .as_str()
        .unwrap()
        .starts_with("sha256:"));
}

#[test]
fn metrics_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    let metrics = std::fs::read_to_string(test_helpers::workspace_root().join(PASSING)).unwrap();
    igate_run_stdin(&["record", &session, "--metrics", "-"], &metrics, 0);
}

// ── Rejected input leaves the session untouched ─────────────────

#[test]
fn missing_metric_fails_without_recording() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    let before = std::fs::read_to_string(&session).unwrap();

    let out = igate_run(
        &["record", &session, "--metrics", "demos/metrics/missing-runtime.json"],
        1,
    );
    assert!(String::from_utf8_lossy(&out.stderr).contains("missing metric: runtime_errors"));
    assert_eq!(std::fs::read_to_string(&session).unwrap(), before);
}

#[test]
fn unknown_metric_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    let metrics = temp_path(dir.path(), "bad.json");
    std::fs::write(&metrics, r#"{"critical_issues": 0, "coverage": 80}"#).unwrap();
    igate_run(&["record", &session, "--metrics", &metrics], 1);
}

#[test]
fn recording_before_approval_is_illegal() {
    let dir = tempfile::tempdir().unwrap();
    let session = temp_path(dir.path(), "early.session.json");
    igate_run(&["start", MINIMAL, "--session", &session], 0);
    let out = igate_run(&["record", &session, "--metrics", PASSING], 1);
    assert!(String::from_utf8_lossy(&out.stderr).contains("illegal transition"));
}

#[test]
fn start_refuses_existing_session() {
    let dir = tempfile::tempdir().unwrap();
    let session = temp_path(dir.path(), "dup.session.json");
    igate_run(&["start", MINIMAL, "--session", &session], 0);
    igate_run(&["start", MINIMAL, "--session", &session], 1);
}

#[test]
fn concurrent_starts_create_one_session() {
    let dir = tempfile::tempdir().unwrap();
    let session = temp_path(dir.path(), "race.session.json");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            std::thread::spawn(move || {
                test_helpers::igate_bin()
                    .args(["start", MINIMAL, "--session", &session])
                    .output()
                    .unwrap()
                    .status
                    .success()
            })
        })
        .collect();
    let started = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(started, 1);

    let entries = audit_entries(&temp_path(dir.path(), "race.audit.jsonl"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["event_type"], "SessionStarted");
}

#[test]
fn held_lock_blocks_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    let now = chrono::Utc::now().timestamp();
    std::fs::write(format!("{session}.lock"), format!("1\n{now}\n")).unwrap();
    let out = igate_run(&["record", &session, "--metrics", PASSING], 1);
    assert!(String::from_utf8_lossy(&out.stderr).contains("locked"));
}

// ── External escalation and abort ───────────────────────────────

#[test]
fn escalate_then_abort_is_illegal() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    igate_run(&["escalate", &session, "--reason", "needs architect"], 0);
    igate_run(&["abort", &session, "--reason", "too late"], 1);

    let status = igate_json(&["status", &session, "--json"], 0);
    assert_eq!(status["phase"], "escalated");
}

#[test]
fn abort_from_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let session = temp_path(dir.path(), "drop.session.json");
    igate_run(&["start", MINIMAL, "--session", &session], 0);
    igate_run(&["abort", &session, "--reason", "scope cut"], 0);
    let status = igate_stdout(&["status", &session]);
    assert!(status.contains("phase:      aborted"));
}

// ── Audit trail ─────────────────────────────────────────────────

#[test]
fn audit_log_records_lifecycle_and_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    igate_run(&["record", &session, "--metrics", FAILING], 2);
    igate_run(&["record", &session, "--metrics", PASSING], 0);

    let audit = temp_path(dir.path(), "demo.audit.jsonl");
    let entries = audit_entries(&audit);
    let events: Vec<&str> = entries
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(
        events,
        vec![
            "SessionStarted",
            "PhaseTransition",
            "IterationRecorded",
            "PhaseTransition",
            "IterationRecorded",
            "PhaseTransition",
            "PhaseTransition",
        ]
    );
    assert_eq!(entries[0]["prev_hash"], "genesis");

    let out = igate_run(&["audit", &session, "--verify"], 0);
    assert!(String::from_utf8_lossy(&out.stderr).contains("audit chain valid (7 entries)"));
}

#[test]
fn escalation_is_audited_as_escalation() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, ONE_SHOT);
    igate_run(&["record", &session, "--metrics", FAILING], 3);

    let entries = audit_entries(&temp_path(dir.path(), "demo.audit.jsonl"));
    let last = entries.last().unwrap();
    assert_eq!(last["event_type"], "Escalation");
    assert_eq!(last["trigger"], "escalate");
}

#[test]
fn tampered_audit_log_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    igate_run(&["record", &session, "--metrics", FAILING], 2);

    let audit = temp_path(dir.path(), "demo.audit.jsonl");
    let content = std::fs::read_to_string(&audit).unwrap();
    assert!(content.contains("approved by lead"));
    std::fs::write(&audit, content.replacen("approved by lead", "approved by mallory", 1)).unwrap();

    igate_run(&["audit", &session, "--verify"], 1);
}

#[test]
fn checkpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    let cp = temp_path(dir.path(), "demo.checkpoint.json");

    igate_run(&["audit", &session, "--checkpoint", &cp], 0);
    igate_run(&["record", &session, "--metrics", PASSING], 0);
    igate_run(&["audit", &session, "--verify-checkpoint", &cp], 0);
}

#[test]
fn deleted_audit_log_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    let cp = temp_path(dir.path(), "demo.checkpoint.json");
    igate_run(&["audit", &session, "--checkpoint", &cp], 0);

    std::fs::remove_file(temp_path(dir.path(), "demo.audit.jsonl")).unwrap();

    let out = igate_run(&["audit", &session, "--verify-checkpoint", &cp], 1);
    assert!(String::from_utf8_lossy(&out.stderr).contains("no audit log found"));
    igate_run(&["audit", &session, "--verify"], 1);
}

#[test]
fn audit_config_can_silence_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let workflow = temp_path(dir.path(), "quiet.workflow.json");
    let mut doc: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(test_helpers::workspace_root().join(MINIMAL)).unwrap(),
    )
    .unwrap();
    doc["audit"] = serde_json::json!({"log_transitions": false, "log_iterations": false});
    std::fs::write(&workflow, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    let session = temp_path(dir.path(), "quiet.session.json");
    igate_run(&["start", &workflow, "--session", &session], 0);
    igate_run(&["approve", &session], 0);
    igate_run(&["record", &session, "--metrics", PASSING], 0);

    let entries = audit_entries(&temp_path(dir.path(), "quiet.audit.jsonl"));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["event_type"], "SessionStarted");
}

// ── Reports and listing ─────────────────────────────────────────

#[test]
fn text_report_has_one_block_per_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    igate_run(&["record", &session, "--metrics", FAILING], 2);
    igate_run(&["record", &session, "--metrics", PASSING], 0);

    let report = igate_stdout(&["report", &session]);
    assert_eq!(report.matches("iteration: ").count(), 2);
    assert!(report.contains("feedback: quality\n\niteration: 2\n"));
}

#[test]
fn markdown_report_lists_outstanding_feedback() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    igate_run(&["record", &session, "--metrics", FAILING], 2);

    let md = igate_stdout(&["report", &session, "--markdown"]);
    assert!(md.starts_with("# Session: login-form"));
    assert!(md.contains("## Iteration 1: iterate"));
    assert!(md.contains("## Outstanding feedback"));
    assert!(md.contains("1. **quality**"));
}

#[test]
fn list_shows_sessions_in_directory() {
    let dir = tempfile::tempdir().unwrap();
    let session = started(&dir, MINIMAL);
    igate_run(&["record", &session, "--metrics", FAILING], 2);

    let table = igate_stdout(&["list", dir.path().to_str().unwrap()]);
    assert!(table.contains("demo.session.json"));
    assert!(table.contains("login-form"));
    assert!(table.contains("refinement"));
    assert!(table.contains("1/3"));
    assert!(!table.contains("audit"));
}
