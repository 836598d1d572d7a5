//! Per-run mutable state of the generate → verify → review → execute cycle.
//!
//! A [`CycleState`] is created at the start of a run, owned by that run only,
//! and dropped once the result has been reported.

use thiserror::Error;

use crate::core::types::{Approval, Terminal, Verdict};

/// Transitions the controller must never attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("approval recorded without a valid verdict in iteration {iteration}")]
    ApprovalWithoutValidVerdict { iteration: u32 },
    #[error("success recorded without approval in iteration {iteration}")]
    SuccessWithoutApproval { iteration: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleState {
    /// Iterations started so far (0 before the first one).
    pub iteration: u32,
    /// Current candidate; replaced wholesale on every generation.
    pub artifact: String,
    /// Last reviewer feedback or execution failure note.
    pub feedback: String,
    pub verdict: Verdict,
    pub approval: Approval,
    pub terminal: Option<Terminal>,
}

impl Default for CycleState {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleState {
    pub fn new() -> Self {
        Self {
            iteration: 0,
            artifact: String::new(),
            feedback: String::new(),
            verdict: Verdict::Unverified,
            approval: Approval::Pending,
            terminal: None,
        }
    }

    /// Start the next iteration if the budget allows it.
    ///
    /// Returns `false` (and marks the state exhausted) once `budget` iterations
    /// have been started.
    pub fn begin_iteration(&mut self, budget: u32) -> bool {
        if self.terminal.is_some() {
            return false;
        }
        if self.iteration >= budget {
            self.terminal = Some(Terminal::ExhaustedBudget);
            return false;
        }
        self.iteration += 1;
        self.verdict = Verdict::Unverified;
        self.approval = Approval::Pending;
        true
    }

    pub fn replace_artifact(&mut self, artifact: String) {
        self.artifact = artifact;
    }

    /// Record the verifier's judgment. An invalid artifact clears feedback so the
    /// next generation starts from the task and previous artifact only.
    pub fn record_verdict(&mut self, verdict: Verdict) {
        if verdict == Verdict::Invalid {
            self.feedback.clear();
        }
        self.verdict = verdict;
    }

    /// Record the reviewer's judgment. Rejection feedback replaces the current
    /// feedback.
    pub fn record_approval(&mut self, approval: Approval) -> Result<(), StateError> {
        if self.verdict != Verdict::Valid {
            return Err(StateError::ApprovalWithoutValidVerdict {
                iteration: self.iteration,
            });
        }
        if let Approval::Rejected { feedback } = &approval {
            self.feedback = feedback.clone();
        }
        self.approval = approval;
        Ok(())
    }

    pub fn record_execution_failure(&mut self, output: &str) {
        self.feedback = execution_failure_feedback(output);
    }

    pub fn record_success(&mut self) -> Result<(), StateError> {
        if self.approval != Approval::Approved {
            return Err(StateError::SuccessWithoutApproval {
                iteration: self.iteration,
            });
        }
        self.terminal = Some(Terminal::Succeeded);
        Ok(())
    }

    pub fn is_succeeded(&self) -> bool {
        self.terminal == Some(Terminal::Succeeded)
    }
}

/// Feedback handed to the generator after an approved artifact failed to run.
pub fn execution_failure_feedback(output: &str) -> String {
    format!("Reviewer approved, but execution failed.\n\nError output:\n{output}")
}
