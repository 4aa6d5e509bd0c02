//! Harness configuration stored at `.config/bork.json`.
//!
//! The file is operator-owned and the harness never writes it. Absence is
//! equivalent to an empty object; unknown fields are ignored so older
//! harnesses keep working against newer configs.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::core::path::RepoPath;
use crate::core::policy::{CONFIG_REL_PATH, WritePolicy};

/// Fatal configuration failure. The loop must not start (and must not write
/// anything) on a config it cannot trust.
#[derive(Debug, Error)]
#[error("malformed {CONFIG_REL_PATH}: {reason}")]
pub struct ConfigMalformed {
    pub reason: String,
}

/// Validated harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BorkConfig {
    /// Repo-relative path of the correctness checker, when configured.
    pub correctness_checker: Option<RepoPath>,
    /// Paths whose edits need per-change human approval.
    pub edits_require_approval: BTreeSet<RepoPath>,
}

/// Raw wire shape. Serde ignores unknown fields by default, which is exactly
/// the forward-compatibility the config contract asks for.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(rename = "correctness-checker")]
    correctness_checker: Option<String>,
    #[serde(rename = "edits-require-approval")]
    edits_require_approval: Option<Vec<String>>,
}

impl BorkConfig {
    /// Load from `<root>/.config/bork.json`. Missing file: defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_REL_PATH);
        if !path.exists() {
            debug!("no {CONFIG_REL_PATH}; using defaults");
            return Ok(Self::default());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json(&contents)
    }

    /// Parse and validate a config document.
    pub fn from_json(contents: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(contents).map_err(|err| ConfigMalformed {
            reason: format!("invalid JSON: {err}"),
        })?;

        let correctness_checker = match raw.correctness_checker {
            None => None,
            Some(value) => Some(parse_config_path("correctness-checker", &value)?),
        };

        let mut edits_require_approval = BTreeSet::new();
        for value in raw.edits_require_approval.unwrap_or_default() {
            edits_require_approval.insert(parse_config_path("edits-require-approval", &value)?);
        }

        Ok(Self {
            correctness_checker,
            edits_require_approval,
        })
    }

    /// Derive the write rules this config implies.
    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy::new(
            self.correctness_checker.clone(),
            self.edits_require_approval.clone(),
        )
    }
}

fn parse_config_path(field: &str, value: &str) -> Result<RepoPath, ConfigMalformed> {
    RepoPath::parse_config(value).map_err(|err| ConfigMalformed {
        reason: format!("{field} entry {value:?}: {err}"),
    })
}
