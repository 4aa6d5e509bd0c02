//! Stable exit codes of the harness process.

/// Reconciliation terminated clean (checker saw zero findings, or none is
/// configured).
pub const CLEAN: i32 = 0;
/// Iteration cap hit with unresolved findings; human intervention requested.
pub const ESCALATE: i32 = 1;
/// Fatal error: malformed config, unreachable model, undecodable reply, or
/// checker breakdown.
pub const ERROR: i32 = 2;
