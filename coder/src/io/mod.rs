//! Side-effecting collaborators: model backend, sandbox, config and prompts.

pub mod completion;
pub mod config;
pub mod process;
pub mod prompt;
pub mod sandbox;
