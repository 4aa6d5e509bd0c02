//! Safety-property tests: nothing the model proposes may reach outside the
//! repo root or touch protected paths.
//!
//! The repo sits one level below its tempdir, so the tempdir is a witness
//! directory: any escape would create entries next to `repo/`.

use std::fs;
use std::os::unix::fs::symlink;

use bork::reconcile::{ReconcileOutcome, run_reconciliation};
use bork::test_support::{ApproveAll, DenyAll, ScriptedGate, ScriptedLlm, TestRepo};

/// Path-traversal attempt: no file is created anywhere, and with no checker
/// configured the run still terminates clean.
#[test]
fn traversal_attempt_creates_nothing() {
    let repo = TestRepo::new().expect("repo");
    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {"../evil": "x", "/abs/evil": "y"}, "delete": ["../../gone"]}"#
            .to_string(),
    ]);

    let outcome = run_reconciliation(repo.root(), &llm, &ApproveAll).expect("run");
    assert!(matches!(outcome, ReconcileOutcome::Clean { .. }));
    assert_eq!(repo.witness_entries().expect("witness"), Vec::<String>::new());
    assert!(!repo.root().join("evil").exists());
}

/// Symlink attack: a write through a symlinked directory must not land at the
/// link target, and the run continues.
#[test]
fn symlink_component_never_reaches_the_target() {
    let repo = TestRepo::new().expect("repo");
    let target_dir = repo.witness().join("target");
    fs::create_dir(&target_dir).expect("mkdir target");
    symlink(&target_dir, repo.root().join("link")).expect("symlink");

    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {"link/file": "x", "ok.txt": "fine"}, "delete": []}"#.to_string(),
    ]);
    let outcome = run_reconciliation(repo.root(), &llm, &ApproveAll).expect("run");

    assert!(matches!(outcome, ReconcileOutcome::Clean { .. }));
    assert!(!target_dir.join("file").exists(), "symlink target must stay empty");
    // The sibling action still applied: per-action failures are local.
    assert_eq!(fs::read_to_string(repo.root().join("ok.txt")).expect("read"), "fine");
}

/// Immutability: `.git/**` and `.config/bork.json` survive any reply
/// byte-for-byte.
#[test]
fn immutable_paths_survive_write_and_delete_attempts() {
    let repo = TestRepo::new().expect("repo");
    repo.write_config(r#"{"edits-require-approval": []}"#).expect("config");
    let config_before = fs::read(repo.root().join(".config/bork.json")).expect("read config");
    let git_config_before = fs::read(repo.root().join(".git/config")).expect("read git config");

    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {".config/bork.json": "{}", ".git/config": "[hijacked]"},
            "delete": [".git/HEAD"]}"#
            .to_string(),
    ]);
    let outcome = run_reconciliation(repo.root(), &llm, &ApproveAll).expect("run");

    assert!(matches!(outcome, ReconcileOutcome::Clean { .. }));
    assert_eq!(
        fs::read(repo.root().join(".config/bork.json")).expect("read config"),
        config_before
    );
    assert_eq!(
        fs::read(repo.root().join(".git/config")).expect("read git config"),
        git_config_before
    );
    assert!(repo.root().join(".git/HEAD").exists());
}

/// Spec edits go through the gate; a denial leaves the file untouched.
#[test]
fn denied_spec_edit_is_dropped_and_gate_saw_it() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("specs/goal.md", "keep me\n").expect("write");
    repo.commit_all("add spec").expect("commit");

    let gate = ScriptedGate::new(vec![false]);
    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {"specs/goal.md": "overwrite"}, "delete": []}"#.to_string(),
    ]);
    run_reconciliation(repo.root(), &llm, &gate).expect("run");

    assert_eq!(gate.asked.borrow().as_slice(), ["specs/goal.md"]);
    assert_eq!(
        fs::read_to_string(repo.root().join("specs/goal.md")).expect("read"),
        "keep me\n"
    );
}

/// Approval is per-action: a mixed reply asks once per protected path and
/// honors each answer independently.
#[test]
fn approval_is_per_action() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("specs/a.md", "a\n").expect("write");
    repo.write_file("specs/b.md", "b\n").expect("write");
    repo.commit_all("specs").expect("commit");

    // Paths arrive in the reply's sorted key order: a.md then b.md.
    let gate = ScriptedGate::new(vec![true, false]);
    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {"specs/a.md": "a2\n", "specs/b.md": "b2\n"}, "delete": []}"#
            .to_string(),
    ]);
    run_reconciliation(repo.root(), &llm, &gate).expect("run");

    assert_eq!(gate.asked.borrow().len(), 2);
    assert_eq!(fs::read_to_string(repo.root().join("specs/a.md")).expect("read"), "a2\n");
    assert_eq!(fs::read_to_string(repo.root().join("specs/b.md")).expect("read"), "b\n");
}

/// Deleting an absent path is a no-op and the tree stays bit-identical.
#[test]
fn deleting_an_absent_path_changes_nothing() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("present.txt", "here\n").expect("write");
    repo.commit_all("file").expect("commit");
    let before = repo.tree_digest().expect("digest");

    let llm = ScriptedLlm::new(vec![
        r#"{"create-or-update": {}, "delete": ["ghost.txt", "no/such/dir/file"]}"#.to_string(),
    ]);
    let outcome = run_reconciliation(repo.root(), &llm, &DenyAll).expect("run");

    assert!(matches!(outcome, ReconcileOutcome::Clean { .. }));
    assert_eq!(repo.tree_digest().expect("digest"), before);
}

/// Round-trip: committing back the bytes the snapshot read leaves the tree
/// bit-identical.
#[test]
fn snapshot_bytes_committed_back_are_a_fixed_point() {
    let repo = TestRepo::new().expect("repo");
    repo.write_file("src/app.rs", "fn main() {\n    run();\n}\n").expect("write");
    repo.write_file("data.txt", "tab\there\n").expect("write");
    repo.commit_all("content").expect("commit");
    let before = repo.tree_digest().expect("digest");

    // Echo both files back verbatim.
    let reply = serde_json::json!({
        "create-or-update": {
            "src/app.rs": "fn main() {\n    run();\n}\n",
            "data.txt": "tab\there\n",
        },
        "delete": [],
    });
    let llm = ScriptedLlm::new(vec![reply.to_string()]);
    run_reconciliation(repo.root(), &llm, &DenyAll).expect("run");

    assert_eq!(repo.tree_digest().expect("digest"), before);
    assert_eq!(repo.witness_entries().expect("witness"), Vec::<String>::new());
}
