//! The cycle controller: generate → verify → review → execute, bounded.
//!
//! One [`CycleController::run`] call owns one [`CycleState`] and drives it
//! strictly sequentially. The controller itself is immutable and can serve
//! any number of concurrent runs.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::core::budget::{bounded_timeout, remaining_budget};
use crate::core::fence::strip_code_fences;
use crate::core::protocol::VerdictProtocol;
use crate::core::state::{CycleState, StateError};
use crate::core::types::{Approval, IterationRecord, Outcome, Stage, Verdict};
use crate::io::completion::{CompletionError, CompletionRequest, CompletionService, Role};
use crate::io::config::CoderConfig;
use crate::io::prompt::PromptEngine;
use crate::io::sandbox::{ExecutionLimits, Sandbox};

/// Immutable input of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRequest {
    pub task: String,
}

impl CycleRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self { task: task.into() }
    }
}

/// Why a run stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller fired the cancellation signal.
    Signal,
    /// The run exceeded its wall-clock budget.
    Deadline,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Signal => f.write_str("cancellation requested"),
            CancelReason::Deadline => f.write_str("run deadline exceeded"),
        }
    }
}

/// Failures that abort a run. Unsatisfactory model output never ends up here.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("completion service failed during {role} step: {source}")]
    Completion {
        role: Role,
        #[source]
        source: CompletionError,
    },
    #[error("run cancelled in iteration {iteration}: {reason}")]
    Cancelled { iteration: u32, reason: CancelReason },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StateError> for CycleError {
    fn from(err: StateError) -> Self {
        CycleError::Internal(err.to_string())
    }
}

/// Terminal state of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRun {
    /// Last artifact produced, whether or not it was validated.
    pub artifact: String,
    pub outcome: Outcome,
    /// Iterations consumed.
    pub iterations: u32,
    /// Feedback pending at the end of the run (empty on success).
    pub feedback: String,
    pub trace: Vec<IterationRecord>,
}

/// Knobs of the controller, usually derived from [`CoderConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSettings {
    pub max_cycles: u32,
    pub min_artifact_chars: usize,
    pub run_timeout: Duration,
    pub system: Option<String>,
    /// Run approved artifacts in the sandbox.
    pub execute: bool,
    pub limits: ExecutionLimits,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from_config(&CoderConfig::default())
    }
}

impl CycleSettings {
    pub fn from_config(config: &CoderConfig) -> Self {
        Self {
            max_cycles: config.max_cycles,
            min_artifact_chars: config.min_artifact_chars,
            run_timeout: config.run_timeout(),
            system: config.completion.system.clone(),
            execute: config.sandbox.enabled,
            limits: ExecutionLimits::from_config(&config.sandbox),
        }
    }
}

pub struct CycleController<C, S> {
    completion: C,
    sandbox: S,
    protocol: Box<dyn VerdictProtocol>,
    prompts: PromptEngine,
    settings: CycleSettings,
}

impl<C: CompletionService, S: Sandbox> CycleController<C, S> {
    pub fn new(
        completion: C,
        sandbox: S,
        protocol: Box<dyn VerdictProtocol>,
        prompts: PromptEngine,
        settings: CycleSettings,
    ) -> Self {
        Self {
            completion,
            sandbox,
            protocol,
            prompts,
            settings,
        }
    }

    /// Build a controller whose protocol, prompts and settings follow `config`.
    pub fn from_config(completion: C, sandbox: S, config: &CoderConfig) -> Self {
        Self::new(
            completion,
            sandbox,
            config.protocol.build(),
            PromptEngine::new(config.protocol),
            CycleSettings::from_config(config),
        )
    }

    pub fn completion(&self) -> &C {
        &self.completion
    }

    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    /// Drive the cycle until the artifact executes successfully or the budget runs out.
    ///
    /// Returns an error only for an empty task, a completion-service failure, or
    /// cancellation; every other disappointment is fed back into the next iteration.
    #[instrument(skip_all, fields(max_cycles = self.settings.max_cycles))]
    pub async fn run(
        &self,
        request: &CycleRequest,
        cancel: &CancelSignal,
    ) -> Result<CycleRun, CycleError> {
        let task = request.task.trim();
        if task.is_empty() {
            return Err(CycleError::Validation(
                "task must not be empty".to_string(),
            ));
        }

        info!(task_chars = task.chars().count(), "starting run");
        let deadline = Instant::now() + self.settings.run_timeout;
        let mut state = CycleState::new();
        let mut trace = Vec::new();
        let mut outcome = Outcome::BudgetExhausted;

        while state.begin_iteration(self.settings.max_cycles) {
            let started = Instant::now();
            let stage = self
                .run_iteration(task, &mut state, deadline, cancel)
                .await?;
            info!(iteration = state.iteration, stage = ?stage, "iteration finished");
            trace.push(IterationRecord {
                iteration: state.iteration,
                stage,
                artifact_chars: state.artifact.chars().count(),
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            });

            match stage {
                Stage::Executed => {
                    outcome = Outcome::ExecutedSuccessfully;
                    break;
                }
                Stage::ApprovedNotExecuted => {
                    outcome = Outcome::ApprovedNotExecuted;
                    break;
                }
                _ => {}
            }
        }

        if outcome == Outcome::BudgetExhausted {
            warn!(iterations = state.iteration, "cycle budget exhausted");
        }
        Ok(CycleRun {
            artifact: state.artifact,
            outcome,
            iterations: state.iteration,
            feedback: state.feedback,
            trace,
        })
    }

    async fn run_iteration(
        &self,
        task: &str,
        state: &mut CycleState,
        deadline: Instant,
        cancel: &CancelSignal,
    ) -> Result<Stage, CycleError> {
        let iteration = state.iteration;

        let prompt = self
            .prompts
            .render_generator(task, &state.artifact, &state.feedback)
            .map_err(internal)?;
        let generated = self
            .call(Role::Generator, prompt, iteration, deadline, cancel)
            .await?;
        state.replace_artifact(strip_code_fences(&generated));
        let artifact_chars = state.artifact.chars().count();
        debug!(iteration, artifact_chars, "artifact generated");
        if artifact_chars < self.settings.min_artifact_chars {
            warn!(
                iteration,
                artifact_chars,
                min = self.settings.min_artifact_chars,
                "artifact too short, regenerating"
            );
            return Ok(Stage::TooShort);
        }

        let prompt = self
            .prompts
            .render_verifier(&state.artifact)
            .map_err(internal)?;
        let verification = self
            .call(Role::Verifier, prompt, iteration, deadline, cancel)
            .await?;
        let verdict = self.protocol.parse_verification(&verification);
        state.record_verdict(verdict);
        debug!(iteration, verdict = ?verdict, "artifact verified");
        if verdict != Verdict::Valid {
            return Ok(Stage::Invalid);
        }

        let prompt = self
            .prompts
            .render_reviewer(&state.artifact, &verification)
            .map_err(internal)?;
        let review = self
            .call(Role::Reviewer, prompt, iteration, deadline, cancel)
            .await?;
        let approval = self.protocol.parse_review(&review);
        let approved = approval == Approval::Approved;
        state.record_approval(approval)?;
        if !approved {
            debug!(iteration, "reviewer requested changes");
            return Ok(Stage::Rejected);
        }
        if !self.settings.execute {
            return Ok(Stage::ApprovedNotExecuted);
        }

        let timeout = bounded_timeout(deadline, self.settings.limits.timeout).ok_or(
            CycleError::Cancelled {
                iteration,
                reason: CancelReason::Deadline,
            },
        )?;
        let limits = ExecutionLimits {
            timeout,
            ..self.settings.limits
        };
        let remaining =
            remaining_budget(deadline).ok_or(cancelled(iteration, CancelReason::Deadline))?;
        let execution = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(iteration, CancelReason::Signal)),
            execution = self.sandbox.execute(&state.artifact, limits, cancel) => execution,
            _ = tokio::time::sleep(remaining) => {
                return Err(cancelled(iteration, CancelReason::Deadline));
            }
        };
        if execution.cancelled {
            return Err(cancelled(iteration, CancelReason::Signal));
        }
        if execution.success {
            state.record_success()?;
            return Ok(Stage::Executed);
        }

        debug!(iteration, "approved artifact failed to execute");
        state.record_execution_failure(&execution.output);
        Ok(Stage::ExecutionFailed)
    }

    /// One completion call raced against cancellation and the run deadline.
    async fn call(
        &self,
        role: Role,
        prompt: String,
        iteration: u32,
        deadline: Instant,
        cancel: &CancelSignal,
    ) -> Result<String, CycleError> {
        if cancel.is_cancelled() {
            return Err(cancelled(iteration, CancelReason::Signal));
        }
        let remaining =
            remaining_budget(deadline).ok_or(cancelled(iteration, CancelReason::Deadline))?;
        let request = CompletionRequest {
            role,
            system: self.settings.system.clone(),
            prompt,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled(iteration, CancelReason::Signal)),
            _ = tokio::time::sleep(remaining) => Err(cancelled(iteration, CancelReason::Deadline)),
            result = self.completion.complete(&request) => result.map_err(|source| {
                warn!(iteration, role = role.as_str(), err = %source, "completion failed");
                CycleError::Completion { role, source }
            }),
        }
    }
}

fn cancelled(iteration: u32, reason: CancelReason) -> CycleError {
    CycleError::Cancelled { iteration, reason }
}

fn internal(err: anyhow::Error) -> CycleError {
    CycleError::Internal(format!("{err:#}"))
}
