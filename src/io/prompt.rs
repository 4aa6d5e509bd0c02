//! Prompt assembly: one self-describing request per iteration.
//!
//! The model is stateless across iterations, so every request restates the
//! reply schema, the file roles, and the full repo contents. File boundaries
//! carry a random per-request token regenerated until no snapshot file
//! contains it, so arbitrary file contents cannot forge a marker.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use rand::{Rng, distributions::Alphanumeric};
use serde::Serialize;
use tracing::debug;

use crate::core::findings::CheckerReport;
use crate::core::policy::CONFIG_REL_PATH;
use crate::io::snapshot::RepoSnapshot;

const RECONCILE_TEMPLATE: &str = include_str!("prompts/reconcile.md");
const BOUNDARY_LEN: usize = 16;

/// Per-file context handed to the template.
#[derive(Debug, Serialize)]
struct FileContext {
    path: String,
    role: &'static str,
    body: String,
}

/// Everything one request needs.
#[derive(Debug)]
pub struct PromptInputs<'a> {
    pub snapshot: &'a RepoSnapshot,
    pub last_findings: Option<&'a CheckerReport>,
    /// 1-indexed iteration counter, restated to the model each request.
    pub iteration: u32,
    pub max_iterations: u32,
}

/// Assemble the full request payload.
pub fn assemble_prompt(inputs: &PromptInputs<'_>) -> Result<String> {
    let files: Vec<FileContext> = inputs
        .snapshot
        .files
        .iter()
        .map(|file| FileContext {
            path: file.path.as_str().to_string(),
            role: file.role.label(),
            body: String::from_utf8_lossy(&file.contents).into_owned(),
        })
        .collect();

    let boundary = fresh_boundary(&files);

    let findings = match inputs.last_findings {
        Some(report) if !report.is_empty() => Some(
            serde_json::to_string_pretty(report).context("serialize findings for prompt")?,
        ),
        _ => None,
    };

    let mut env = Environment::new();
    env.add_template("reconcile", RECONCILE_TEMPLATE)
        .expect("reconcile template should be valid");
    let template = env.get_template("reconcile").expect("template registered");
    let rendered = template
        .render(context! {
            boundary => boundary,
            iteration => inputs.iteration,
            max_iterations => inputs.max_iterations,
            config_path => CONFIG_REL_PATH,
            spec_diff => inputs
                .snapshot
                .spec_diff
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty()),
            findings => findings,
            files => files,
        })
        .context("render reconcile prompt")?;

    debug!(
        files = files.len(),
        bytes = rendered.len(),
        has_findings = inputs.last_findings.is_some(),
        "assembled prompt"
    );
    Ok(rendered)
}

/// Draw boundary tokens until one collides with no file body or path.
fn fresh_boundary(files: &[FileContext]) -> String {
    loop {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(BOUNDARY_LEN)
            .map(char::from)
            .collect();
        let collides = files
            .iter()
            .any(|f| f.body.contains(&token) || f.path.contains(&token));
        if !collides {
            return token;
        }
    }
}
