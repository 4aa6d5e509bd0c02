//! The reconciliation loop: snapshot -> prompt -> LLM -> validate -> commit
//! -> check, at most five times.
//!
//! The loop is an explicit state value (iteration counter plus the last
//! checker report), not a recursion of closures: the termination table in
//! [`run_reconciliation`] is the whole policy. Nothing is ever rolled back; a
//! later iteration's edits overwrite earlier ones naturally.

use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::action::Action;
use crate::core::findings::{CheckerOutcome, CheckerReport, Finding};
use crate::core::validate::{ValidationReport, validate_changes};
use crate::io::approval::ApprovalGate;
use crate::io::checker::run_checker;
use crate::io::commit::apply_actions;
use crate::io::config::BorkConfig;
use crate::io::llm::{LlmClient, request_changes};
use crate::io::prompt::{PromptInputs, assemble_prompt};
use crate::io::snapshot::snapshot_repo;

/// Iteration cap: the safety bound on non-convergence, not a correctness
/// claim. Iterations 1..=5 are the five LLM calls.
pub const MAX_ITERATIONS: u32 = 5;

/// Fatal checker breakdown. Findings are a normal outcome; this is the
/// checker itself not holding up its contract.
#[derive(Debug, Error)]
#[error("correctness checker failed: {reason}")]
pub struct CheckerFailure {
    pub reason: String,
}

/// Terminal states of one reconciliation run.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The checker (when configured) saw a compliant tree.
    Clean { iterations: u32 },
    /// The cap was hit with findings outstanding. The last proposal is
    /// already committed; a human must review.
    Escalate {
        iterations: u32,
        findings: CheckerReport,
    },
}

/// Mutable loop state, owned by the controller alone.
#[derive(Debug, Default)]
struct LoopState {
    last_findings: Option<CheckerReport>,
}

/// Run one reconciliation of the repo at `root`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_reconciliation<L: LlmClient, A: ApprovalGate>(
    root: &Path,
    llm: &L,
    gate: &A,
) -> Result<ReconcileOutcome> {
    // Config problems must surface before any write.
    let config = BorkConfig::load(root)?;
    let policy = config.write_policy();
    let mut state = LoopState::default();

    for iteration in 1..=MAX_ITERATIONS {
        let snapshot = snapshot_repo(root)?;
        eprintln!(
            "Collected {} files; iteration {iteration}/{MAX_ITERATIONS}; querying model...",
            snapshot.file_count()
        );

        let prompt = assemble_prompt(&PromptInputs {
            snapshot: &snapshot,
            last_findings: state.last_findings.as_ref(),
            iteration,
            max_iterations: MAX_ITERATIONS,
        })?;

        // A reply that fails to decode applies zero actions.
        let changes = request_changes(llm, &prompt).context("query model")?;
        let report = validate_changes(&changes, &policy);
        commit_iteration(root, gate, report)?;

        let Some(checker) = &config.correctness_checker else {
            eprintln!("No correctness checker configured; single iteration complete.");
            return Ok(ReconcileOutcome::Clean { iterations: iteration });
        };

        match run_checker(root, checker)? {
            CheckerOutcome::Clean => {
                eprintln!("No findings from correctness checker; ending loop.");
                return Ok(ReconcileOutcome::Clean { iterations: iteration });
            }
            CheckerOutcome::Findings(findings) => {
                if iteration == MAX_ITERATIONS {
                    eprintln!(
                        "Cycle limit reached ({MAX_ITERATIONS} iterations) with findings \
                         outstanding. Latest changes were applied; human intervention requested."
                    );
                    return Ok(ReconcileOutcome::Escalate {
                        iterations: iteration,
                        findings,
                    });
                }
                eprintln!(
                    "Correctness checker reported {} finding(s); commencing next loop.",
                    findings.len()
                );
                state.last_findings = Some(findings);
            }
            CheckerOutcome::Failed { reason, detail } => {
                if let Some(finding) = detail {
                    print_checker_detail(&finding);
                }
                warn!(%reason, "checker failed");
                return Err(CheckerFailure { reason }.into());
            }
        }
    }

    unreachable!("loop returns from within the final iteration");
}

/// Mediate approvals and apply the surviving actions for one iteration.
fn commit_iteration<A: ApprovalGate>(
    root: &Path,
    gate: &A,
    report: ValidationReport,
) -> Result<()> {
    for rejection in &report.rejected_syntax {
        // Already logged by the validator; restate the count only.
        info!(raw_path = %rejection.raw_path, "dropped malformed path");
    }
    for action in &report.rejected_immutable {
        print_rejected(action, "immutable path");
    }

    let mut to_apply = report.accepted;
    for action in report.approval_pending {
        print_proposal(&action);
        if gate
            .approve(&action)
            .with_context(|| format!("approval prompt for {}", action.path()))?
        {
            eprintln!("  approved: {} {}", action.verb(), action.path());
            to_apply.push(action);
        } else {
            print_rejected(&action, "approval denied");
        }
    }

    let outcome = apply_actions(root, &to_apply);
    for applied in &outcome.applied {
        eprintln!("  {}: {}", applied.verb(), applied.path());
    }
    for failure in &outcome.failures {
        eprintln!(
            "  failed {} {}: {}",
            failure.action.verb(),
            failure.action.path(),
            failure.error
        );
    }
    Ok(())
}

/// Show the operator exactly what the model wanted to do to a path it may
/// not touch (or was denied).
fn print_rejected(action: &Action, reason: &str) {
    match action {
        Action::CreateOrUpdate { path, contents } => {
            eprintln!("\n--- REJECTED CHANGE ({reason}): {path} ---");
            eprintln!("{contents}");
            eprintln!("--- END REJECTED CHANGE: {path} ---");
        }
        Action::Delete { path } => {
            eprintln!("  rejected delete ({reason}): {path}");
        }
    }
}

fn print_proposal(action: &Action) {
    match action {
        Action::CreateOrUpdate { path, contents } => {
            eprintln!("\n--- PROPOSED CHANGE (REQUIRES APPROVAL): {path} ---");
            eprintln!("{contents}");
            eprintln!("--- END PROPOSED CHANGE: {path} ---");
        }
        Action::Delete { path } => {
            eprintln!("\n--- PROPOSED DELETE (REQUIRES APPROVAL): {path} ---");
        }
    }
}

fn print_checker_detail(finding: &Finding) {
    if let Ok(rendered) = serde_json::to_string_pretty(finding) {
        eprintln!("--- CORRECTNESS CHECKER OUTPUT ---\n{rendered}\n--- END CHECKER OUTPUT ---");
    }
}
