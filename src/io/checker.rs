//! Correctness-checker subprocess runner.
//!
//! Contract with the checker executable: invoked with no arguments, no stdin,
//! CWD = repo root; exit 0 means no findings, exit 1 means findings with a
//! JSON report on stdout, exit 2 means the checker itself failed. The core
//! imposes no time budget; the surrounding sandbox bounds resources.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::findings::{CheckerOutcome, CheckerReport, Finding, utf8_or_sentinel};
use crate::core::path::RepoPath;

/// Run the configured checker once and classify its exit.
///
/// Spawn failures (missing file, no execute bit) classify as `Failed` rather
/// than erroring: the checker is repo-owned state and its absence is a
/// finding about the tree, not about the harness.
#[instrument(skip_all, fields(checker = %checker))]
pub fn run_checker(root: &Path, checker: &RepoPath) -> Result<CheckerOutcome> {
    let executable = checker.to_fs_path(root);
    let spawned = Command::new(&executable)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let output = match spawned {
        Ok(output) => output,
        Err(err) => {
            warn!(%err, "checker failed to spawn");
            return Ok(CheckerOutcome::Failed {
                reason: format!("checker {checker} could not be executed: {err}"),
                detail: None,
            });
        }
    };

    let exit_code = output.status.code();
    let stdout = utf8_or_sentinel(&output.stdout);
    let stderr = utf8_or_sentinel(&output.stderr);
    debug!(?exit_code, stdout_bytes = output.stdout.len(), "checker finished");

    match exit_code {
        Some(0) => Ok(CheckerOutcome::Clean),
        Some(1) => match parse_report(&stdout) {
            Ok(report) => Ok(CheckerOutcome::Findings(report)),
            Err(err) => Ok(failed(
                checker,
                format!("checker reported findings but stdout was not a valid report: {err:#}"),
                stdout,
                stderr,
                1,
            )),
        },
        Some(2) => Ok(failed(
            checker,
            format!("checker {checker} reported it failed to run"),
            stdout,
            stderr,
            2,
        )),
        other => Ok(failed(
            checker,
            format!("checker {checker} exited with unexpected status {other:?}"),
            stdout,
            stderr,
            other.unwrap_or(-1),
        )),
    }
}

fn parse_report(stdout: &str) -> Result<CheckerReport> {
    if stdout.trim().is_empty() {
        anyhow::bail!("stdout was empty; expected JSON");
    }
    serde_json::from_str(stdout).context("parse checker report JSON")
}

/// Build a `Failed` outcome carrying a command finding the runner constructs
/// itself, with the non-UTF-8 sentinel already applied to captured output.
fn failed(
    checker: &RepoPath,
    reason: String,
    stdout: String,
    stderr: String,
    exit_code: i32,
) -> CheckerOutcome {
    CheckerOutcome::Failed {
        reason,
        detail: Some(Finding::Command {
            command: checker.as_str().to_string(),
            stdout,
            stderr,
            exit_code,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::findings::NON_UTF8_SENTINEL;
    use crate::test_support::write_script;

    fn checker_path() -> RepoPath {
        RepoPath::parse("check.sh").expect("path")
    }

    #[test]
    fn exit_zero_is_clean() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_script(
            &temp.path().join("check.sh"),
            "#!/bin/sh\necho '{\"per_file_findings\": [], \"overall_findings\": []}'\nexit 0\n",
        )
        .expect("script");

        let outcome = run_checker(temp.path(), &checker_path()).expect("run");
        assert_eq!(outcome, CheckerOutcome::Clean);
    }

    #[test]
    fn exit_one_with_report_is_findings() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_script(
            &temp.path().join("check.sh"),
            r#"#!/bin/sh
echo '{"per_file_findings": [{"provenance": "code-review", "file": "src/a.rs", "finding": "broken"}], "overall_findings": []}'
exit 1
"#,
        )
        .expect("script");

        let outcome = run_checker(temp.path(), &checker_path()).expect("run");
        match outcome {
            CheckerOutcome::Findings(report) => {
                assert_eq!(report.len(), 1);
                assert_eq!(
                    report.per_file_findings[0],
                    Finding::CodeReview {
                        file: Some("src/a.rs".to_string()),
                        finding: "broken".to_string(),
                    }
                );
            }
            other => panic!("expected findings, got {other:?}"),
        }
    }

    #[test]
    fn exit_one_with_garbage_stdout_escalates_to_failed() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_script(&temp.path().join("check.sh"), "#!/bin/sh\necho not-json\nexit 1\n")
            .expect("script");

        let outcome = run_checker(temp.path(), &checker_path()).expect("run");
        assert!(matches!(outcome, CheckerOutcome::Failed { .. }));
    }

    #[test]
    fn exit_two_and_unexpected_codes_are_failed() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_script(&temp.path().join("check.sh"), "#!/bin/sh\nexit 2\n").expect("script");
        assert!(matches!(
            run_checker(temp.path(), &checker_path()).expect("run"),
            CheckerOutcome::Failed { .. }
        ));

        write_script(&temp.path().join("check.sh"), "#!/bin/sh\nexit 17\n").expect("script");
        assert!(matches!(
            run_checker(temp.path(), &checker_path()).expect("run"),
            CheckerOutcome::Failed { .. }
        ));
    }

    #[test]
    fn missing_checker_is_failed_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = run_checker(temp.path(), &checker_path()).expect("run");
        match outcome {
            CheckerOutcome::Failed { reason, detail } => {
                assert!(reason.contains("could not be executed"));
                assert!(detail.is_none());
            }
            other => panic!("expected failed, got {other:?}"),
        }
    }

    #[test]
    fn non_utf8_output_is_replaced_with_the_sentinel() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_script(
            &temp.path().join("check.sh"),
            "#!/bin/sh\nprintf '\\377\\376'\nexit 2\n",
        )
        .expect("script");

        let outcome = run_checker(temp.path(), &checker_path()).expect("run");
        match outcome {
            CheckerOutcome::Failed { detail: Some(Finding::Command { stdout, .. }), .. } => {
                assert_eq!(stdout, NON_UTF8_SENTINEL);
            }
            other => panic!("expected command detail, got {other:?}"),
        }
    }

    #[test]
    fn checker_runs_with_repo_root_cwd() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_script(
            &temp.path().join("check.sh"),
            "#!/bin/sh\ntest -f marker.txt || exit 2\nexit 0\n",
        )
        .expect("script");
        std::fs::write(temp.path().join("marker.txt"), "here").expect("write marker");

        let outcome = run_checker(temp.path(), &checker_path()).expect("run");
        assert_eq!(outcome, CheckerOutcome::Clean);
    }
}
