//! Human approval gate for protected edits.
//!
//! Approval is per-action and never cached: a path approved in one iteration
//! must be approved again if the model touches it in the next.

use std::io::{BufRead, IsTerminal, Write};

use anyhow::{Context, Result};

use crate::core::action::Action;

/// Synchronous approval callback.
pub trait ApprovalGate {
    /// Ask the human to approve one action. The proposed contents (or delete
    /// intent) have already been printed by the caller.
    fn approve(&self, action: &Action) -> Result<bool>;
}

/// Interactive gate: requires a terminal on stdin and a literal `yes`.
///
/// Non-interactive stdin denies everything, so unattended runs can never
/// self-approve a protected edit.
pub struct TerminalApproval;

impl ApprovalGate for TerminalApproval {
    fn approve(&self, action: &Action) -> Result<bool> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            eprintln!(
                "  (non-interactive stdin; denying {} to {})",
                action.verb(),
                action.path()
            );
            return Ok(false);
        }

        eprint!(
            "Approve {} to {}? Type 'yes' to approve: ",
            action.verb(),
            action.path()
        );
        std::io::stderr().flush().context("flush approval prompt")?;

        let mut answer = String::new();
        stdin
            .lock()
            .read_line(&mut answer)
            .context("read approval answer")?;
        Ok(answer.trim().eq_ignore_ascii_case("yes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path::RepoPath;

    struct Scripted(bool);

    impl ApprovalGate for Scripted {
        fn approve(&self, _action: &Action) -> Result<bool> {
            Ok(self.0)
        }
    }

    #[test]
    fn gate_is_consulted_per_action() {
        let action = Action::Delete {
            path: RepoPath::parse("specs/a.md").expect("path"),
        };
        assert!(Scripted(true).approve(&action).expect("approve"));
        assert!(!Scripted(false).approve(&action).expect("deny"));
    }
}
