//! Checker output data model.
//!
//! These types define the wire contract with the correctness checker and must
//! stay stable: the checker is a separately-maintained executable. Field names
//! are kebab-case where the checker emits kebab-case (`exit-code`), with a
//! snake_case alias accepted for tolerance.

use serde::{Deserialize, Serialize};

/// Sentinel substituted for checker output that is not valid UTF-8.
pub const NON_UTF8_SENTINEL: &str = "<non-UTF8 output>";

/// A single observation from the checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provenance", rename_all = "kebab-case")]
pub enum Finding {
    /// Freeform review text, optionally anchored to a file.
    CodeReview {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        finding: String,
    },
    /// A captured command execution.
    Command {
        command: String,
        stdout: String,
        stderr: String,
        #[serde(rename = "exit-code", alias = "exit_code")]
        exit_code: i32,
    },
}

/// Parsed checker stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerReport {
    #[serde(default)]
    pub per_file_findings: Vec<Finding>,
    #[serde(default)]
    pub overall_findings: Vec<Finding>,
}

impl CheckerReport {
    pub fn is_empty(&self) -> bool {
        self.per_file_findings.is_empty() && self.overall_findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.per_file_findings.len() + self.overall_findings.len()
    }
}

/// Classified result of one checker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckerOutcome {
    /// Exit 0: the post-commit tree is compliant.
    Clean,
    /// Exit 1 with a parseable report.
    Findings(CheckerReport),
    /// Exit 2, an unexpected exit code, unparseable output, or spawn failure.
    Failed {
        reason: String,
        /// Diagnostics constructed by the runner (command provenance).
        detail: Option<Finding>,
    },
}

/// Decode subprocess output, substituting the sentinel when it is not UTF-8.
///
/// The whole stream is replaced, not individual bytes: a partially-decoded
/// stream is worse for the model than an honest marker.
pub fn utf8_or_sentinel(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => NON_UTF8_SENTINEL.to_string(),
    }
}
