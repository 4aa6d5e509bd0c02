//! Test-only helpers: scripted model backends, scripted approval gates, and
//! disposable git repos.
//!
//! `TestRepo` places the repo one directory below the tempdir root so the
//! tempdir itself doubles as a witness: anything escaping the repo root would
//! land there and be caught by [`TestRepo::witness_entries`].

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};

use crate::core::action::Action;
use crate::io::approval::ApprovalGate;
use crate::io::llm::{LlmClient, LlmError};

/// A disposable git repository with an initial commit on `main`.
pub struct TestRepo {
    temp: tempfile::TempDir,
    root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let root = temp.path().join("repo");
        fs::create_dir(&root).context("create repo dir")?;

        run_git(&root, &["init"])?;
        run_git(&root, &["config", "user.email", "test@example.com"])?;
        run_git(&root, &["config", "user.name", "test"])?;
        fs::write(root.join("README.md"), "test repo\n").context("write README")?;
        run_git(&root, &["add", "-A"])?;
        run_git(&root, &["commit", "-m", "chore: init"])?;
        run_git(&root, &["branch", "-M", "main"])?;

        Ok(Self { temp, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory above the repo root. Files appearing here mean an
    /// escape.
    pub fn witness(&self) -> &Path {
        self.temp.path()
    }

    /// Entries in the witness directory other than the repo itself.
    pub fn witness_entries(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.witness()).context("read witness dir")? {
            let entry = entry.context("witness entry")?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name != "repo" {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write a file (test setup only; creates parent directories).
    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Write `.config/bork.json`.
    pub fn write_config(&self, json: &str) -> Result<()> {
        self.write_file(".config/bork.json", json)
    }

    /// Stage and commit everything.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        run_git(&self.root, &["add", "-A"])?;
        run_git(&self.root, &["commit", "-m", message])?;
        Ok(())
    }

    /// Map of every non-`.git` file to its bytes, for before/after
    /// comparisons.
    pub fn tree_digest(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut digest = BTreeMap::new();
        collect_files(&self.root, &self.root, &mut digest)?;
        Ok(digest)
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    digest: &mut BTreeMap<String, Vec<u8>>,
) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry.context("dir entry")?;
        let path = entry.path();
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }
        let file_type = entry.file_type().context("file type")?;
        if file_type.is_dir() {
            collect_files(root, &path, digest)?;
        } else if file_type.is_file() {
            let rel = path
                .strip_prefix(root)
                .context("strip repo prefix")?
                .to_string_lossy()
                .into_owned();
            digest.insert(rel, fs::read(&path).context("read file")?);
        }
    }
    Ok(())
}

fn run_git(root: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}

/// Write an executable shell script (for checker fixtures).
pub fn write_script(path: &Path, body: &str) -> Result<()> {
    fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("chmod {}", path.display()))?;
    }
    Ok(())
}

/// Model backend returning canned replies, recording every prompt it saw.
pub struct ScriptedLlm {
    replies: RefCell<VecDeque<String>>,
    repeating: Option<String>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedLlm {
    /// Replies are consumed in order; running out is a test bug.
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            repeating: None,
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// The same reply for every call.
    pub fn repeating(reply: &str) -> Self {
        Self {
            replies: RefCell::new(VecDeque::new()),
            repeating: Some(reply.to_string()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Number of completed model calls.
    pub fn calls(&self) -> u32 {
        self.prompts.borrow().len() as u32
    }

    /// The prompt of call `index` (0-based).
    pub fn prompt(&self, index: usize) -> String {
        self.prompts.borrow()[index].clone()
    }
}

impl LlmClient for ScriptedLlm {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        if let Some(reply) = &self.repeating {
            return Ok(reply.clone());
        }
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| LlmError::Unreachable("scripted replies exhausted".to_string()))
    }
}

/// Gate that approves everything.
pub struct ApproveAll;

impl ApprovalGate for ApproveAll {
    fn approve(&self, _action: &Action) -> Result<bool> {
        Ok(true)
    }
}

/// Gate that denies everything.
pub struct DenyAll;

impl ApprovalGate for DenyAll {
    fn approve(&self, _action: &Action) -> Result<bool> {
        Ok(false)
    }
}

/// Gate that records what it was asked and answers from a script.
pub struct ScriptedGate {
    answers: RefCell<VecDeque<bool>>,
    pub asked: RefCell<Vec<String>>,
}

impl ScriptedGate {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            asked: RefCell::new(Vec::new()),
        }
    }
}

impl ApprovalGate for ScriptedGate {
    fn approve(&self, action: &Action) -> Result<bool> {
        self.asked
            .borrow_mut()
            .push(action.path().as_str().to_string());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(false))
    }
}
