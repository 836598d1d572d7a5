//! Shared deterministic types for the cycle controller.
//!
//! These types define the stable contract between the controller, the result
//! reporter and the transport adapters. They carry no I/O.

use serde::{Deserialize, Serialize};

/// Verifier judgment of the current artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// No verification has run in the current iteration.
    Unverified,
    Valid,
    Invalid,
}

/// Reviewer judgment of the current artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    /// No review has run in the current iteration.
    Pending,
    Approved,
    /// Reviewer asked for changes; the text becomes the next feedback.
    Rejected { feedback: String },
}

/// Terminal marker held by [`crate::core::state::CycleState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Succeeded,
    ExhaustedBudget,
}

/// How a completed run ended.
///
/// Errors (validation, completion service, cancellation) are not outcomes;
/// they are reported through [`crate::cycle::CycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The approved artifact ran in the sandbox and exited successfully.
    ExecutedSuccessfully,
    /// The artifact was approved but execution is disabled.
    ApprovedNotExecuted,
    /// The cycle budget ran out before a successful execution.
    BudgetExhausted,
}

/// Furthest stage an iteration reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Generated artifact was below the minimum length.
    TooShort,
    /// Verifier rejected the artifact.
    Invalid,
    /// Reviewer asked for changes.
    Rejected,
    /// Approved, but the sandbox run failed.
    ExecutionFailed,
    /// Approved and executed successfully.
    Executed,
    /// Approved; execution disabled.
    ApprovedNotExecuted,
}

/// One entry of the in-memory iteration trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration number (1-indexed).
    pub iteration: u32,
    pub stage: Stage,
    /// Length of the stripped artifact in characters.
    pub artifact_chars: usize,
    pub duration_ms: u64,
}
