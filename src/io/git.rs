//! Git adapter for repo snapshotting.
//!
//! The harness only ever reads from git: file listings, the specs baseline,
//! and the specs diff. It never stages, commits, or touches `.git/` in any
//! other way, so the wrapper stays small and explicit.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True when the workdir sits inside a git work tree.
    pub fn is_work_tree(&self) -> bool {
        match self.run(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) => {
                out.status.success()
                    && String::from_utf8_lossy(&out.stdout).trim() == "true"
            }
            Err(_) => false,
        }
    }

    /// Check whether a ref resolves.
    pub fn ref_exists(&self, reference: &str) -> Result<bool> {
        let status = self
            .run(&["rev-parse", "--verify", "--quiet", reference])?
            .status;
        Ok(status.success())
    }

    /// Resolve the baseline ref the specs are compared against.
    ///
    /// Local `main` wins over the remote-tracking spellings.
    #[instrument(skip_all)]
    pub fn resolve_baseline(&self) -> Result<Option<String>> {
        for candidate in ["main", "origin/main", "refs/remotes/origin/main"] {
            if self.ref_exists(candidate)? {
                debug!(baseline = candidate, "resolved baseline ref");
                return Ok(Some(candidate.to_string()));
            }
        }
        debug!("no baseline ref found");
        Ok(None)
    }

    /// Tracked files, NUL-separated so arbitrary filenames survive.
    pub fn ls_files_tracked(&self) -> Result<Vec<String>> {
        self.run_paths_z(&["ls-files", "-z", "--cached"])
    }

    /// Untracked files that are not ignored.
    pub fn ls_files_untracked(&self) -> Result<Vec<String>> {
        self.run_paths_z(&["ls-files", "-z", "--others", "--exclude-standard"])
    }

    /// File names present under `prefix` on the given ref.
    pub fn ls_tree_names(&self, reference: &str, prefix: &str) -> Result<Vec<String>> {
        self.run_paths_z(&["ls-tree", "-r", "-z", "--name-only", reference, "--", prefix])
    }

    /// Unified diff of `prefix` against the given ref.
    pub fn diff_against(&self, reference: &str, prefix: &str) -> Result<String> {
        self.run_capture(&["diff", "--no-color", reference, "--", prefix])
    }

    fn run_paths_z(&self, args: &[&str]) -> Result<Vec<String>> {
        let output = self.run_checked(args)?;
        let raw = String::from_utf8_lossy(&output.stdout);
        Ok(raw
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
