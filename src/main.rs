//! Spec reconciliation harness CLI.
//!
//! `bork reconcile` runs the edit loop against the repo at `--root` (default:
//! the current directory). `bork check` runs the configured correctness
//! checker once and reports its outcome with the same exit codes.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use bork::exit_codes;
use bork::io::approval::TerminalApproval;
use bork::io::checker::run_checker;
use bork::io::config::BorkConfig;
use bork::io::llm::HttpLlmClient;
use bork::core::findings::CheckerOutcome;
use bork::reconcile::{ReconcileOutcome, run_reconciliation};

#[derive(Parser)]
#[command(
    name = "bork",
    version,
    about = "Brings a codebase into compliance with its specs via a bounded LLM edit loop"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one reconciliation (up to five model iterations).
    Reconcile {
        /// Repository root. Defaults to the current directory.
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Run the configured correctness checker once.
    Check {
        /// Repository root. Defaults to the current directory.
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    bork::logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::ERROR
        }
    };
    ExitCode::from(code as u8)
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Reconcile { root } => cmd_reconcile(resolve_root(root)?),
        Command::Check { root } => cmd_check(resolve_root(root)?),
    }
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    match root {
        Some(root) => Ok(root),
        None => Ok(std::env::current_dir()?),
    }
}

fn cmd_reconcile(root: PathBuf) -> Result<i32> {
    let llm = HttpLlmClient::from_env()?;
    match run_reconciliation(&root, &llm, &TerminalApproval)? {
        ReconcileOutcome::Clean { iterations } => {
            eprintln!("Converged after {iterations} iteration(s).");
            Ok(exit_codes::CLEAN)
        }
        ReconcileOutcome::Escalate { iterations, findings } => {
            eprintln!(
                "Unresolved after {iterations} iteration(s): {} finding(s) outstanding.",
                findings.len()
            );
            if let Ok(rendered) = serde_json::to_string_pretty(&findings) {
                eprintln!("{rendered}");
            }
            Ok(exit_codes::ESCALATE)
        }
    }
}

fn cmd_check(root: PathBuf) -> Result<i32> {
    let config = BorkConfig::load(&root)?;
    let Some(checker) = &config.correctness_checker else {
        eprintln!("No correctness checker configured.");
        return Ok(exit_codes::CLEAN);
    };
    match run_checker(&root, checker)? {
        CheckerOutcome::Clean => {
            eprintln!("Checker reported no findings.");
            Ok(exit_codes::CLEAN)
        }
        CheckerOutcome::Findings(report) => {
            if let Ok(rendered) = serde_json::to_string_pretty(&report) {
                eprintln!("{rendered}");
            }
            Ok(exit_codes::ESCALATE)
        }
        CheckerOutcome::Failed { reason, .. } => {
            eprintln!("Checker failed: {reason}");
            Ok(exit_codes::ERROR)
        }
    }
}
