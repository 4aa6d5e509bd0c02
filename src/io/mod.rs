//! Adapters around the outside world: filesystem, git, the model endpoint,
//! the approval prompt, and the checker subprocess.

pub mod approval;
pub mod checker;
pub mod commit;
pub mod config;
pub mod git;
pub mod llm;
pub mod prompt;
pub mod snapshot;
