//! Proposed and vetted file mutations.
//!
//! A [`ChangeSet`] is the decoded LLM reply: raw path strings, untrusted.
//! An [`Action`] only exists after validation and carries a [`RepoPath`].

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::core::path::RepoPath;

/// Decoded reply payload. Both fields default to empty; unknown top-level
/// fields in the reply are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChangeSet {
    #[serde(rename = "create-or-update", default)]
    pub create_or_update: BTreeMap<String, String>,
    #[serde(default)]
    pub delete: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.create_or_update.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.create_or_update.len() + self.delete.len()
    }
}

/// A vetted mutation, safe to hand to the committer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateOrUpdate { path: RepoPath, contents: String },
    Delete { path: RepoPath },
}

impl Action {
    pub fn path(&self) -> &RepoPath {
        match self {
            Action::CreateOrUpdate { path, .. } => path,
            Action::Delete { path } => path,
        }
    }

    /// Short verb for operator-facing messages.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::CreateOrUpdate { .. } => "update/create",
            Action::Delete { .. } => "delete",
        }
    }
}
