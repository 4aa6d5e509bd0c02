//! Filesystem committer: the only code that mutates the working tree.
//!
//! Writes are symlink-resistant and atomic: every directory component from
//! the repo root outward is checked with `symlink_metadata` and refused if it
//! is a symlink; contents land in a sibling temporary file and are renamed
//! into place; a symlinked destination is removed (never followed) before the
//! rename. Deletes walk the same way and are idempotent.
//!
//! ## Known limitation: TOCTOU window
//!
//! A race remains between the component walk and the rename: an attacker with
//! concurrent write access to the tree could swap a directory for a symlink
//! in that window. Closing it fully requires dir-fd-relative operations
//! (`openat` with `O_NOFOLLOW` per component), which std does not expose
//! portably. The sandbox the harness runs in is the boundary that carries
//! this residual risk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::action::Action;
use crate::core::path::RepoPath;

const TMP_SUFFIX: &str = ".bork-tmp";

/// Per-action commit failure. Local to the action: the rest of the set still
/// applies.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("symlink in path component {component}")]
    SymlinkInPath { component: PathBuf },
    #[error("path component {component} is not a directory")]
    NotADirectory { component: PathBuf },
    #[error("refusing to delete non-empty directory {path}")]
    NonEmptyDirectory { path: PathBuf },
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One action that could not be applied.
#[derive(Debug)]
pub struct ActionFailure {
    pub action: Action,
    pub error: CommitError,
}

/// What one commit pass did.
#[derive(Debug, Default)]
pub struct CommitOutcome {
    pub applied: Vec<Action>,
    pub failures: Vec<ActionFailure>,
}

/// Apply every action; per-action failures are collected, never fatal.
#[instrument(skip_all, fields(actions = actions.len()))]
pub fn apply_actions(root: &Path, actions: &[Action]) -> CommitOutcome {
    let mut outcome = CommitOutcome::default();
    for action in actions {
        let result = match action {
            Action::CreateOrUpdate { path, contents } => {
                write_file_safe(root, path, contents.as_bytes())
            }
            Action::Delete { path } => delete_safe(root, path),
        };
        match result {
            Ok(()) => {
                debug!(path = %action.path(), verb = action.verb(), "applied");
                outcome.applied.push(action.clone());
            }
            Err(error) => {
                warn!(path = %action.path(), %error, "action failed");
                outcome.failures.push(ActionFailure {
                    action: action.clone(),
                    error,
                });
            }
        }
    }
    outcome
}

/// Write `contents` to `<root>/<path>`, creating real directories as needed.
pub fn write_file_safe(root: &Path, path: &RepoPath, contents: &[u8]) -> Result<(), CommitError> {
    let parent = walk_and_create_parents(root, path)?;
    let segments: Vec<&str> = path.segments().collect();
    let file_name = segments.last().expect("RepoPath is never empty");
    let target = parent.join(file_name);

    // A symlinked destination is replaced, never followed. Re-verify the
    // parents under the same walk before removing it.
    match fs::symlink_metadata(&target) {
        Ok(meta) if meta.file_type().is_symlink() => {
            walk_parents(root, path, false)?;
            fs::remove_file(&target).map_err(|source| CommitError::Io {
                path: target.clone(),
                source,
            })?;
        }
        _ => {}
    }

    let tmp = parent.join(format!("{file_name}{TMP_SUFFIX}"));
    fs::write(&tmp, contents).map_err(|source| CommitError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, &target).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        CommitError::Io {
            path: target.clone(),
            source,
        }
    })?;
    Ok(())
}

/// Delete `<root>/<path>`. Missing targets are a no-op; regular files,
/// symlinks (the link itself), and empty directories are removed; anything
/// else is refused.
pub fn delete_safe(root: &Path, path: &RepoPath) -> Result<(), CommitError> {
    let parent = match walk_parents(root, path, true)? {
        Some(parent) => parent,
        // A missing parent directory means a missing target.
        None => return Ok(()),
    };
    let segments: Vec<&str> = path.segments().collect();
    let file_name = segments.last().expect("RepoPath is never empty");
    let target = parent.join(file_name);

    let meta = match fs::symlink_metadata(&target) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(CommitError::Io {
                path: target,
                source,
            })
        }
    };

    if meta.is_dir() {
        // remove_dir only succeeds on empty directories.
        return fs::remove_dir(&target).map_err(|source| {
            if source.kind() == std::io::ErrorKind::DirectoryNotEmpty
                || source.raw_os_error() == Some(39)
            {
                CommitError::NonEmptyDirectory { path: target }
            } else {
                CommitError::Io {
                    path: target,
                    source,
                }
            }
        });
    }
    // Regular file or symlink: remove_file unlinks the entry itself and
    // never follows a link.
    fs::remove_file(&target).map_err(|source| CommitError::Io {
        path: target,
        source,
    })
}

/// Walk the parent components of `path`, creating missing directories.
fn walk_and_create_parents(root: &Path, path: &RepoPath) -> Result<PathBuf, CommitError> {
    let segments: Vec<&str> = path.segments().collect();
    let mut current = root.to_path_buf();
    for segment in &segments[..segments.len() - 1] {
        current.push(segment);
        match fs::symlink_metadata(&current) {
            Ok(meta) => check_component(&current, &meta)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                match fs::create_dir(&current) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                        // Raced: something appeared. Re-check; a symlink that
                        // slipped in is still refused.
                        let meta = fs::symlink_metadata(&current).map_err(|source| {
                            CommitError::Io {
                                path: current.clone(),
                                source,
                            }
                        })?;
                        check_component(&current, &meta)?;
                    }
                    Err(source) => {
                        return Err(CommitError::Io {
                            path: current,
                            source,
                        })
                    }
                }
            }
            Err(source) => {
                return Err(CommitError::Io {
                    path: current,
                    source,
                })
            }
        }
    }
    Ok(current)
}

/// Walk the parent components without creating anything.
///
/// With `missing_ok`, a missing component returns `Ok(None)`; otherwise it is
/// an error. A symlink component is always refused.
fn walk_parents(
    root: &Path,
    path: &RepoPath,
    missing_ok: bool,
) -> Result<Option<PathBuf>, CommitError> {
    let segments: Vec<&str> = path.segments().collect();
    let mut current = root.to_path_buf();
    for segment in &segments[..segments.len() - 1] {
        current.push(segment);
        match fs::symlink_metadata(&current) {
            Ok(meta) => check_component(&current, &meta)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && missing_ok => {
                return Ok(None);
            }
            Err(source) => {
                return Err(CommitError::Io {
                    path: current,
                    source,
                })
            }
        }
    }
    Ok(Some(current))
}

fn check_component(component: &Path, meta: &fs::Metadata) -> Result<(), CommitError> {
    if meta.file_type().is_symlink() {
        return Err(CommitError::SymlinkInPath {
            component: component.to_path_buf(),
        });
    }
    if !meta.is_dir() {
        return Err(CommitError::NotADirectory {
            component: component.to_path_buf(),
        });
    }
    Ok(())
}
