//! Result reporter: the caller-facing view of a finished run.

use serde::Serialize;

use crate::core::types::Outcome;
use crate::cycle::{CycleError, CycleRun};
use crate::exit_codes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    ExecutedSuccessfully,
    ApprovedNotExecuted,
    BudgetExhausted,
    ValidationError,
    ServiceError,
    Cancelled,
    InternalError,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::ExecutedSuccessfully => "executed_successfully",
            Status::ApprovedNotExecuted => "approved_not_executed",
            Status::BudgetExhausted => "budget_exhausted",
            Status::ValidationError => "validation_error",
            Status::ServiceError => "service_error",
            Status::Cancelled => "cancelled",
            Status::InternalError => "internal_error",
        }
    }

    /// True when the run reached a terminal outcome rather than an error.
    pub fn is_completed(self) -> bool {
        matches!(
            self,
            Status::ExecutedSuccessfully | Status::ApprovedNotExecuted | Status::BudgetExhausted
        )
    }
}

impl From<Outcome> for Status {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::ExecutedSuccessfully => Status::ExecutedSuccessfully,
            Outcome::ApprovedNotExecuted => Status::ApprovedNotExecuted,
            Outcome::BudgetExhausted => Status::BudgetExhausted,
        }
    }
}

/// What transports hand back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub status: Status,
    /// Final artifact; absent when the run ended in an error.
    #[serde(rename = "result")]
    pub artifact: Option<String>,
    pub message: Option<String>,
    pub iterations: u32,
}

impl Report {
    pub fn from_run(result: Result<CycleRun, CycleError>) -> Self {
        match result {
            Ok(run) => {
                let status = Status::from(run.outcome);
                let message = match run.outcome {
                    Outcome::ExecutedSuccessfully => None,
                    Outcome::ApprovedNotExecuted => Some(
                        "approved by the reviewer; execution is disabled".to_string(),
                    ),
                    Outcome::BudgetExhausted if run.feedback.is_empty() => Some(format!(
                        "no executable artifact after {} iterations",
                        run.iterations
                    )),
                    Outcome::BudgetExhausted => Some(format!(
                        "no executable artifact after {} iterations; last feedback:\n{}",
                        run.iterations, run.feedback
                    )),
                };
                Self {
                    status,
                    artifact: Some(run.artifact),
                    message,
                    iterations: run.iterations,
                }
            }
            Err(err) => {
                let (status, iterations) = match &err {
                    CycleError::Validation(_) => (Status::ValidationError, 0),
                    CycleError::Completion { .. } => (Status::ServiceError, 0),
                    CycleError::Cancelled { iteration, .. } => (Status::Cancelled, *iteration),
                    CycleError::Internal(_) => (Status::InternalError, 0),
                };
                Self {
                    status,
                    artifact: None,
                    message: Some(err.to_string()),
                    iterations,
                }
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            Status::ExecutedSuccessfully | Status::ApprovedNotExecuted | Status::BudgetExhausted => {
                exit_codes::OK
            }
            Status::ValidationError | Status::InternalError => exit_codes::INVALID,
            Status::ServiceError => exit_codes::SERVICE,
            Status::Cancelled => exit_codes::CANCELLED,
        }
    }

    /// One-line human summary for stderr.
    pub fn summary(&self) -> String {
        match &self.message {
            Some(message) => format!(
                "{} ({} iterations): {}",
                self.status.as_str(),
                self.iterations,
                message
            ),
            None => format!("{} ({} iterations)", self.status.as_str(), self.iterations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CancelReason;
    use crate::io::completion::{CompletionError, Role};
    use serde_json::json;

    fn run(outcome: Outcome, feedback: &str) -> CycleRun {
        CycleRun {
            artifact: "print(42)".to_string(),
            outcome,
            iterations: 3,
            feedback: feedback.to_string(),
            trace: Vec::new(),
        }
    }

    #[test]
    fn success_carries_artifact_without_message() {
        let report = Report::from_run(Ok(run(Outcome::ExecutedSuccessfully, "")));
        assert_eq!(report.status, Status::ExecutedSuccessfully);
        assert_eq!(report.artifact.as_deref(), Some("print(42)"));
        assert_eq!(report.message, None);
        assert_eq!(report.exit_code(), exit_codes::OK);
    }

    #[test]
    fn exhausted_budget_reports_last_feedback() {
        let report = Report::from_run(Ok(run(Outcome::BudgetExhausted, "handle n < 0")));
        assert_eq!(report.status, Status::BudgetExhausted);
        assert_eq!(report.artifact.as_deref(), Some("print(42)"));
        assert_eq!(report.exit_code(), exit_codes::OK);
        let message = report.message.as_deref().expect("message");
        assert!(message.contains("after 3 iterations"));
        assert!(message.ends_with("handle n < 0"));
    }

    #[test]
    fn approved_not_executed_is_not_success() {
        let report = Report::from_run(Ok(run(Outcome::ApprovedNotExecuted, "")));
        assert_eq!(report.status, Status::ApprovedNotExecuted);
        assert!(report.message.is_some());
        assert_ne!(report.status, Status::ExecutedSuccessfully);
    }

    #[test]
    fn errors_carry_no_artifact() {
        let cases = [
            (
                CycleError::Validation("task must not be empty".to_string()),
                Status::ValidationError,
                exit_codes::INVALID,
            ),
            (
                CycleError::Completion {
                    role: Role::Reviewer,
                    source: CompletionError::Transport("refused".to_string()),
                },
                Status::ServiceError,
                exit_codes::SERVICE,
            ),
            (
                CycleError::Cancelled {
                    iteration: 2,
                    reason: CancelReason::Signal,
                },
                Status::Cancelled,
                exit_codes::CANCELLED,
            ),
            (
                CycleError::Internal("broken".to_string()),
                Status::InternalError,
                exit_codes::INVALID,
            ),
        ];
        for (err, status, code) in cases {
            let report = Report::from_run(Err(err));
            assert_eq!(report.status, status);
            assert_eq!(report.artifact, None);
            assert!(report.message.is_some());
            assert_eq!(report.exit_code(), code);
            assert!(!status.is_completed());
        }
    }

    #[test]
    fn completion_error_message_names_the_role() {
        let report = Report::from_run(Err(CycleError::Completion {
            role: Role::Reviewer,
            source: CompletionError::Transport("refused".to_string()),
        }));
        let message = report.message.expect("message");
        assert!(message.contains("reviewer"));
        assert!(message.contains("refused"));
    }

    #[test]
    fn serializes_artifact_as_result() {
        let report = Report::from_run(Ok(run(Outcome::ExecutedSuccessfully, "")));
        let value = serde_json::to_value(&report).expect("json");
        assert_eq!(
            value,
            json!({
                "status": "executed_successfully",
                "result": "print(42)",
                "message": null,
                "iterations": 3
            })
        );
    }
}
