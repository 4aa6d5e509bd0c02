//! Normalized repo-relative paths.
//!
//! Every path that crosses the LLM boundary is parsed into a [`RepoPath`]
//! before anything else looks at it. Parsing is purely lexical: no filesystem
//! access, no joining against the repo root until after the path has been
//! accepted. Rejection reasons are captured in [`PathError`] so the validator
//! can log what the model tried.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Reasons a proposed path is rejected before any policy check runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("NUL byte in path")]
    Nul,
    #[error("backslash in path")]
    Backslash,
    #[error("absolute path")]
    Absolute,
    #[error("'..' segment in path")]
    Traversal,
    #[error("'.' segment in path")]
    DotSegment,
}

/// A normalized relative path inside the repo root.
///
/// Stored as `/`-separated segments with duplicate separators collapsed.
/// Two `RepoPath`s are equal iff their normalized segment sequences are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RepoPath(String);

impl RepoPath {
    /// Parse an untrusted path (e.g. from an LLM reply).
    ///
    /// Rejects empty/whitespace-only input, NUL bytes, backslashes, absolute
    /// paths, and any `.` or `..` segment. Duplicate separators and a single
    /// trailing separator are collapsed.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.trim().is_empty() {
            return Err(PathError::Empty);
        }
        if raw.contains('\0') {
            return Err(PathError::Nul);
        }
        // Backslashes would mean alternate separators on some platforms and
        // ambiguity everywhere else.
        if raw.contains('\\') {
            return Err(PathError::Backslash);
        }
        if raw.starts_with('/') {
            return Err(PathError::Absolute);
        }

        let mut segments = Vec::new();
        for segment in raw.split('/') {
            if segment.is_empty() {
                // Collapses "a//b" and a trailing "/".
                continue;
            }
            match segment {
                ".." => return Err(PathError::Traversal),
                "." => return Err(PathError::DotSegment),
                _ => segments.push(segment),
            }
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    /// Parse an operator-configured path.
    ///
    /// Config files conventionally write checker paths as `./checker.py`;
    /// leading `./` prefixes are stripped before the strict rules apply.
    pub fn parse_config(raw: &str) -> Result<Self, PathError> {
        let mut trimmed = raw.trim();
        while let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        }
        Self::parse(trimmed)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate the normalized segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// First segment of the path (the top-level directory or file name).
    pub fn first_segment(&self) -> &str {
        self.segments().next().unwrap_or_default()
    }

    /// True if the path lives under the given top-level directory.
    pub fn is_under(&self, dir: &str) -> bool {
        self.first_segment() == dir && self.0.len() > dir.len()
    }

    /// Join onto the repo root. Safe by construction: the path has no
    /// absolute prefix and no traversal segments.
    pub fn to_fs_path(&self, root: &std::path::Path) -> std::path::PathBuf {
        let mut full = root.to_path_buf();
        for segment in self.segments() {
            full.push(segment);
        }
        full
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
