//! Loop-level tests for full reconciliation lifecycles: convergence,
//! iteration bounding, and escalation, driven by scripted model backends and
//! shell-script checkers.

use std::fs;

use bork::reconcile::{MAX_ITERATIONS, ReconcileOutcome, run_reconciliation};
use bork::test_support::{ApproveAll, DenyAll, ScriptedLlm, TestRepo, write_script};

const NO_CHANGES: &str = r#"{"create-or-update": {}, "delete": []}"#;

/// No checker configured, model proposes a create: one iteration, the file
/// exists, the run is clean.
#[test]
fn single_iteration_create_without_checker() {
    let repo = TestRepo::new().expect("repo");
    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {"hello.txt": "hi\n"}, "delete": []}"#.to_string(),
    ]);

    let outcome = run_reconciliation(repo.root(), &llm, &ApproveAll).expect("run");
    assert!(matches!(outcome, ReconcileOutcome::Clean { iterations: 1 }));
    assert_eq!(llm.calls(), 1);
    assert_eq!(fs::read_to_string(repo.root().join("hello.txt")).expect("read"), "hi\n");
}

/// The checker gates convergence: the loop keeps iterating until the model
/// produces the file the checker demands, then terminates clean.
#[test]
fn loop_converges_when_the_checker_is_satisfied() {
    let repo = TestRepo::new().expect("repo");
    repo.write_config(r#"{"correctness-checker": "check.sh"}"#).expect("config");
    write_script(
        &repo.root().join("check.sh"),
        r#"#!/bin/sh
if [ -f required.txt ]; then exit 0; fi
echo '{"per_file_findings": [], "overall_findings": [{"provenance": "code-review", "file": "required.txt", "finding": "required.txt is missing"}]}'
exit 1
"#,
    )
    .expect("script");

    // Iteration 1: an unrelated edit. Iteration 2: the fix.
    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {"notes.md": "thinking...\n"}, "delete": []}"#.to_string(),
        r#"{"create-or-update": {"required.txt": "now present\n"}, "delete": []}"#.to_string(),
    ]);

    let outcome = run_reconciliation(repo.root(), &llm, &DenyAll).expect("run");
    assert!(matches!(outcome, ReconcileOutcome::Clean { iterations: 2 }));
    assert_eq!(llm.calls(), 2);
    assert!(repo.root().join("required.txt").exists());
    // The second prompt carried the first run's finding verbatim.
    assert!(llm.prompt(1).contains("required.txt is missing"));
}

/// Iteration cap: a checker that always reports findings bounds the run to
/// exactly five model calls, five commits, and an escalation.
#[test]
fn persistent_findings_hit_the_cap_and_escalate() {
    let repo = TestRepo::new().expect("repo");
    repo.write_config(r#"{"correctness-checker": "check.sh"}"#).expect("config");
    write_script(
        &repo.root().join("check.sh"),
        r#"#!/bin/sh
echo '{"per_file_findings": [], "overall_findings": [{"provenance": "command", "command": "make test", "stdout": "", "stderr": "1 failed", "exit-code": 1}]}'
exit 1
"#,
    )
    .expect("script");

    // Each iteration writes a fresh marker so commits are observable.
    let llm = ScriptedLlm::new(
        (1..=MAX_ITERATIONS)
            .map(|i| {
                format!(r#"{{"create-or-update": {{"attempt-{i}.txt": "try {i}\n"}}, "delete": []}}"#)
            })
            .collect(),
    );

    let outcome = run_reconciliation(repo.root(), &llm, &DenyAll).expect("run");
    match outcome {
        ReconcileOutcome::Escalate { iterations, findings } => {
            assert_eq!(iterations, MAX_ITERATIONS);
            assert_eq!(findings.len(), 1);
        }
        other => panic!("expected escalate, got {other:?}"),
    }
    assert_eq!(llm.calls(), MAX_ITERATIONS);
    for i in 1..=MAX_ITERATIONS {
        assert!(
            repo.root().join(format!("attempt-{i}.txt")).exists(),
            "iteration {i} commit must have been applied"
        );
    }
}

/// Later iterations overwrite earlier edits naturally; nothing rolls back.
#[test]
fn later_iterations_overwrite_without_rollback() {
    let repo = TestRepo::new().expect("repo");
    repo.write_config(r#"{"correctness-checker": "check.sh"}"#).expect("config");
    write_script(
        &repo.root().join("check.sh"),
        r#"#!/bin/sh
grep -q good version.txt 2>/dev/null && exit 0
echo '{"per_file_findings": [], "overall_findings": [{"provenance": "code-review", "finding": "version.txt must say good"}]}'
exit 1
"#,
    )
    .expect("script");

    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {"version.txt": "bad\n"}, "delete": []}"#.to_string(),
        r#"{"create-or-update": {"version.txt": "good\n"}, "delete": []}"#.to_string(),
    ]);

    let outcome = run_reconciliation(repo.root(), &llm, &DenyAll).expect("run");
    assert!(matches!(outcome, ReconcileOutcome::Clean { iterations: 2 }));
    assert_eq!(fs::read_to_string(repo.root().join("version.txt")).expect("read"), "good\n");
}

/// Deletes are first-class actions: an accepted delete removes the file.
#[test]
fn accepted_delete_removes_the_file() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("obsolete.rs", "old\n").expect("write");
    repo.commit_all("add obsolete").expect("commit");

    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {}, "delete": ["obsolete.rs"]}"#.to_string(),
    ]);
    let outcome = run_reconciliation(repo.root(), &llm, &DenyAll).expect("run");
    assert!(matches!(outcome, ReconcileOutcome::Clean { .. }));
    assert!(!repo.root().join("obsolete.rs").exists());
}

/// The prompt restates the repo every iteration, including files the loop
/// itself just wrote.
#[test]
fn prompts_resend_the_full_tree_each_iteration() {
    let repo = TestRepo::new().expect("repo");
    repo.write_config(r#"{"correctness-checker": "check.sh"}"#).expect("config");
    write_script(
        &repo.root().join("check.sh"),
        r#"#!/bin/sh
if [ -f generated.txt ] && [ -f second.txt ]; then exit 0; fi
echo '{"per_file_findings": [], "overall_findings": [{"provenance": "code-review", "finding": "more files needed"}]}'
exit 1
"#,
    )
    .expect("script");

    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {"generated.txt": "first pass\n"}, "delete": []}"#.to_string(),
        r#"{"create-or-update": {"second.txt": "second pass\n"}, "delete": []}"#.to_string(),
    ]);
    run_reconciliation(repo.root(), &llm, &DenyAll).expect("run");

    // The second request must contain the file written by the first.
    assert!(llm.prompt(1).contains("generated.txt"));
    assert!(llm.prompt(1).contains("first pass"));
}

/// A spec diff shows up in the request when specs/ diverges from main.
#[test]
fn spec_divergence_reaches_the_model() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("specs/api.md", "v1 behavior\n").expect("write");
    repo.commit_all("baseline spec").expect("commit");
    repo.write_file("specs/api.md", "v2 behavior\n").expect("write");

    let llm = ScriptedLlm::new(vec![NO_CHANGES.to_string()]);
    run_reconciliation(repo.root(), &llm, &DenyAll).expect("run");

    let prompt = llm.prompt(0);
    assert!(prompt.contains("SPECS DIFF VS MAIN"));
    assert!(prompt.contains("-v1 behavior"));
    assert!(prompt.contains("+v2 behavior"));
}
