//! Repo snapshotting: the faithful picture of the working tree that gets
//! serialized into every LLM request.
//!
//! Enumeration prefers git (tracked plus untracked-non-ignored, the same set
//! a developer sees), with a gitignore-aware walk fallback for trees that are
//! not a work tree. Spec files are compared against the `main` baseline to
//! flag newly added specs and to produce the specs diff.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::Result;
use ignore::WalkBuilder;
use tracing::{debug, instrument, warn};

use crate::core::path::RepoPath;
use crate::io::git::Git;

/// Top-level directory of the spec documents.
pub const SPECS_DIR: &str = "specs";

/// Classification of a snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Code,
    Spec,
    /// Present in the working tree but absent from the `main` baseline.
    NewlyAddedSpec,
}

impl FileRole {
    /// Label used in prompt file markers.
    pub fn label(self) -> &'static str {
        match self {
            FileRole::Code => "code",
            FileRole::Spec => "spec",
            FileRole::NewlyAddedSpec => "spec, newly added",
        }
    }
}

/// One file of the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub path: RepoPath,
    pub contents: Vec<u8>,
    pub role: FileRole,
}

/// Ordered snapshot of the working tree plus the specs baseline diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSnapshot {
    pub files: Vec<FileSnapshot>,
    /// Unified diff of `specs/` against the baseline. `None` when the repo is
    /// not a work tree or no baseline ref resolves. Newly added specs appear
    /// here as filename markers only; their contents live in `files`.
    pub spec_diff: Option<String>,
}

impl RepoSnapshot {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Snapshot the repository at `root`.
///
/// A missing VCS is recoverable: the snapshot degrades to a filesystem walk
/// with every spec classified plainly as a spec and no diff.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn snapshot_repo(root: &Path) -> Result<RepoSnapshot> {
    let git = Git::new(root);
    if !git.is_work_tree() {
        warn!("not a git work tree; snapshotting without a specs baseline");
        return snapshot_without_vcs(root);
    }

    let mut paths: BTreeSet<String> = BTreeSet::new();
    paths.extend(git.ls_files_tracked()?);
    paths.extend(git.ls_files_untracked()?);

    let baseline = git.resolve_baseline()?;
    let baseline_specs: BTreeSet<String> = match &baseline {
        Some(reference) => git
            .ls_tree_names(reference, "specs/")?
            .into_iter()
            .collect(),
        None => BTreeSet::new(),
    };

    let mut files = Vec::new();
    let mut newly_added = Vec::new();
    for rel in paths {
        let Ok(path) = RepoPath::parse(&rel) else {
            // git should not emit hostile names, but nothing downstream may
            // assume that.
            warn!(raw_path = %rel, "skipping unparseable listing entry");
            continue;
        };
        if path.first_segment() == ".git" {
            continue;
        }
        let full = path.to_fs_path(root);
        // lstat: a symlink is skipped rather than read through, so nothing
        // outside the root can leak into the prompt.
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_file() => {}
            _ => continue,
        }
        let Ok(contents) = fs::read(&full) else {
            debug!(path = %path, "skipping unreadable file");
            continue;
        };
        let role = classify(&path, &baseline, &baseline_specs);
        if role == FileRole::NewlyAddedSpec {
            newly_added.push(path.clone());
        }
        files.push(FileSnapshot {
            path,
            contents,
            role,
        });
    }

    let spec_diff = match &baseline {
        Some(reference) => {
            let raw = git.diff_against(reference, "specs/")?;
            Some(render_spec_diff(&raw, &newly_added))
        }
        None => {
            warn!("no main baseline; proceeding without a specs diff");
            None
        }
    };

    debug!(files = files.len(), has_diff = spec_diff.is_some(), "snapshot complete");
    Ok(RepoSnapshot { files, spec_diff })
}

fn classify(path: &RepoPath, baseline: &Option<String>, baseline_specs: &BTreeSet<String>) -> FileRole {
    if !path.is_under(SPECS_DIR) {
        return FileRole::Code;
    }
    match baseline {
        // Without a baseline there is no notion of "newly added".
        None => FileRole::Spec,
        Some(_) => {
            if baseline_specs.contains(path.as_str()) {
                FileRole::Spec
            } else {
                FileRole::NewlyAddedSpec
            }
        }
    }
}

/// Append filename-only markers for newly added specs to the raw diff. Their
/// contents are already in the snapshot list, tagged, and are not duplicated
/// here.
fn render_spec_diff(raw_diff: &str, newly_added: &[RepoPath]) -> String {
    let mut out = raw_diff.trim_end().to_string();
    for path in newly_added {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("# newly added: {path} (contents in the file listing)"));
    }
    out
}

/// Fallback enumeration for non-VCS trees: gitignore-aware walk, hidden files
/// included, `.git` excluded.
fn snapshot_without_vcs(root: &Path) -> Result<RepoSnapshot> {
    let mut files = Vec::new();
    for entry in WalkBuilder::new(root).hidden(false).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%err, "skipping walk entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(rel_str) = rel.to_str() else {
            warn!(path = %rel.display(), "skipping non-UTF-8 file name");
            continue;
        };
        let Ok(path) = RepoPath::parse(rel_str) else {
            continue;
        };
        if path.first_segment() == ".git" {
            continue;
        }
        let Ok(contents) = fs::read(entry.path()) else {
            continue;
        };
        let role = if path.is_under(SPECS_DIR) {
            FileRole::Spec
        } else {
            FileRole::Code
        };
        files.push(FileSnapshot {
            path,
            contents,
            role,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(RepoSnapshot {
        files,
        spec_diff: None,
    })
}
