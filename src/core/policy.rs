//! Write policy: which paths the harness may touch, and on whose authority.
//!
//! Classification is a pure function of the path and the loaded config. Every
//! path gets exactly one class, and the strictest applicable rule wins:
//! `Immutable` over `ApprovalRequired` over `Free`.

use std::collections::BTreeSet;

use crate::core::path::RepoPath;

/// Repo-relative location of the harness config. Never writeable.
pub const CONFIG_REL_PATH: &str = ".config/bork.json";

/// Write-policy category of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionClass {
    /// Never writeable by the harness (`.git/**`, the config file).
    Immutable,
    /// Writeable only after per-edit human approval.
    ApprovalRequired,
    /// Writeable without approval.
    Free,
}

/// Immutable view of the write rules derived from the loaded config.
#[derive(Debug, Clone)]
pub struct WritePolicy {
    checker: Option<RepoPath>,
    approval_paths: BTreeSet<RepoPath>,
}

impl WritePolicy {
    pub fn new(checker: Option<RepoPath>, approval_paths: BTreeSet<RepoPath>) -> Self {
        Self {
            checker,
            approval_paths,
        }
    }

    /// Classify a path. Total: every path maps to exactly one class.
    pub fn classify(&self, path: &RepoPath) -> ProtectionClass {
        // Strictest rule first, so config entries can never weaken it.
        if path.first_segment() == ".git" || path.as_str() == CONFIG_REL_PATH {
            return ProtectionClass::Immutable;
        }
        if path.is_under("specs")
            || self.checker.as_ref() == Some(path)
            || self.approval_paths.contains(path)
        {
            return ProtectionClass::ApprovalRequired;
        }
        ProtectionClass::Free
    }
}
