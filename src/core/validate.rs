//! Vetting of LLM-proposed mutations against the write policy.
//!
//! Checks run in a fixed order per proposal; the first failure decides the
//! disposition:
//!
//! 1. path syntax (lexical) -> silently rejected, logged
//! 2. `Immutable` -> rejected, attempted contents surfaced to the operator
//! 3. `ApprovalRequired` -> queued for a per-action human prompt
//! 4. otherwise -> accepted
//!
//! Symlink resistance is the committer's job: it needs live filesystem state,
//! and this module must stay pure.

use tracing::warn;

use crate::core::action::{Action, ChangeSet};
use crate::core::path::{PathError, RepoPath};
use crate::core::policy::{ProtectionClass, WritePolicy};

/// A proposal dropped before it ever became an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxRejection {
    pub raw_path: String,
    pub error: PathError,
}

/// Disjoint dispositions for one reply's proposals.
///
/// Ordering within each set follows the reply's (sorted) key order; the
/// committer treats application as order-independent.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub accepted: Vec<Action>,
    pub approval_pending: Vec<Action>,
    pub rejected_immutable: Vec<Action>,
    pub rejected_syntax: Vec<SyntaxRejection>,
}

impl ValidationReport {
    fn place(&mut self, action: Action, class: ProtectionClass) {
        match class {
            ProtectionClass::Immutable => self.rejected_immutable.push(action),
            ProtectionClass::ApprovalRequired => self.approval_pending.push(action),
            ProtectionClass::Free => self.accepted.push(action),
        }
    }
}

/// Vet every proposal in `changes` against `policy`.
pub fn validate_changes(changes: &ChangeSet, policy: &WritePolicy) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (raw_path, contents) in &changes.create_or_update {
        match parse_path(raw_path, &mut report) {
            Some(path) => {
                let class = policy.classify(&path);
                report.place(
                    Action::CreateOrUpdate {
                        path,
                        contents: contents.clone(),
                    },
                    class,
                );
            }
            None => continue,
        }
    }

    for raw_path in &changes.delete {
        match parse_path(raw_path, &mut report) {
            Some(path) => {
                let class = policy.classify(&path);
                report.place(Action::Delete { path }, class);
            }
            None => continue,
        }
    }

    report
}

fn parse_path(raw: &str, report: &mut ValidationReport) -> Option<RepoPath> {
    match RepoPath::parse(raw) {
        Ok(path) => Some(path),
        Err(error) => {
            warn!(raw_path = %raw, %error, "dropping proposed path");
            report.rejected_syntax.push(SyntaxRejection {
                raw_path: raw.to_string(),
                error,
            });
            None
        }
    }
}
