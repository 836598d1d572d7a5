//! Self-correcting code generation loop.
//!
//! A task goes through generate → verify → review → execute, and every
//! disappointment (invalid verdict, requested changes, failed execution) is fed
//! back into the next generation until the artifact runs or the cycle budget
//! is spent. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic pieces (state machine, fence stripping,
//!   verdict parsing). No I/O.
//! - **[`io`]**: Side effects (completion service, sandbox, config, prompts),
//!   behind traits so tests can script them.
//!
//! [`cycle`] coordinates the two; [`report`] turns a run into what callers see.

pub mod cancel;
pub mod core;
pub mod cycle;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
