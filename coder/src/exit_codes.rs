//! Stable exit codes for `coder` CLI commands.

/// The run completed: executed, approved without execution, or budget exhausted.
pub const OK: i32 = 0;
/// Invalid task, unreadable or invalid config, or another local error.
pub const INVALID: i32 = 1;
/// The completion service failed mid-run.
pub const SERVICE: i32 = 2;
/// The run was cancelled (Ctrl-C or run deadline).
pub const CANCELLED: i32 = 3;
