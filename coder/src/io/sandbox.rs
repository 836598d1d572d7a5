//! Execution sandbox: runs an approved artifact through an interpreter.
//!
//! The [`Sandbox`] trait is the controller's only view of execution: "run this
//! text, give me combined output and a success flag". [`InterpreterSandbox`]
//! writes the artifact into a private scratch directory and runs the configured
//! interpreter on it.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::io::config::SandboxConfig;
use crate::io::process::run_command_combined;

/// Per-call execution limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl ExecutionLimits {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

/// Result of one sandbox run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Combined stdout/stderr plus any diagnostic notes.
    pub output: String,
    pub success: bool,
    /// True when the run was stopped by the caller's cancellation signal.
    pub cancelled: bool,
}

impl Execution {
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            cancelled: false,
        }
    }
}

/// Abstraction over execution strategies (local interpreter, container, remote).
///
/// Implementations never fail: launch, capture and exit-status problems are all
/// reported as an unsuccessful [`Execution`]. No retries happen here.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(
        &self,
        artifact: &str,
        limits: ExecutionLimits,
        cancel: &CancelSignal,
    ) -> Execution;
}

/// Sandbox that runs `<interpreter> <args..> <script>` in a fresh temp directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterSandbox {
    interpreter: String,
    args: Vec<String>,
    script_name: String,
}

impl InterpreterSandbox {
    pub fn new(
        interpreter: impl Into<String>,
        args: Vec<String>,
        script_name: impl Into<String>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            args,
            script_name: script_name.into(),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(
            config.interpreter.clone(),
            config.args.clone(),
            config.script_name.clone(),
        )
    }

    fn run_blocking(
        &self,
        artifact: &str,
        limits: ExecutionLimits,
        cancel: &CancelSignal,
    ) -> Execution {
        // Dropping the guard removes the directory on every return path.
        let scratch = match tempfile::Builder::new().prefix("coder-sandbox-").tempdir() {
            Ok(dir) => dir,
            Err(err) => {
                warn!(err = %err, "failed to create sandbox directory");
                return Execution::failed(format!(
                    "System error: failed to create sandbox directory: {err}"
                ));
            }
        };
        let script_path = scratch.path().join(&self.script_name);
        if let Err(err) = fs::write(&script_path, artifact) {
            warn!(err = %err, "failed to write artifact");
            return Execution::failed(format!(
                "System error: failed to save code to file: {err}"
            ));
        }
        debug!(script = %script_path.display(), bytes = artifact.len(), "artifact written");

        let cmd = self.command(scratch.path(), &script_path);
        let output = match run_command_combined(
            cmd,
            limits.timeout,
            limits.output_limit_bytes,
            cancel,
        ) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %err, interpreter = %self.interpreter, "failed to run interpreter");
                return Execution::failed(format!(
                    "failed to run {}: {err:#}",
                    self.interpreter
                ));
            }
        };

        let mut text = String::from_utf8_lossy(&output.output).into_owned();
        text.push_str(&output.truncated_notice("sandbox"));
        if output.timed_out {
            text.push_str(&format!("\n[sandbox timed out after {:?}]\n", limits.timeout));
        } else if !output.cancelled && !output.status.success() {
            text.push_str(&format!("\n[exit status: {}]\n", output.status));
        }

        Execution {
            success: output.success(),
            cancelled: output.cancelled,
            output: text,
        }
    }

    fn command(&self, workdir: &Path, script_path: &Path) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.args).arg(script_path).current_dir(workdir);
        cmd
    }
}

#[async_trait]
impl Sandbox for InterpreterSandbox {
    #[instrument(skip_all, fields(interpreter = %self.interpreter, timeout_secs = limits.timeout.as_secs()))]
    async fn execute(
        &self,
        artifact: &str,
        limits: ExecutionLimits,
        cancel: &CancelSignal,
    ) -> Execution {
        let sandbox = self.clone();
        let artifact = artifact.to_string();
        let cancel = cancel.clone();
        let joined =
            tokio::task::spawn_blocking(move || sandbox.run_blocking(&artifact, limits, &cancel))
                .await;

        match joined {
            Ok(execution) => {
                info!(
                    success = execution.success,
                    cancelled = execution.cancelled,
                    "sandbox finished"
                );
                execution
            }
            Err(err) => {
                warn!(err = %err, "sandbox worker failed");
                Execution::failed(format!("System error: sandbox worker failed: {err}"))
            }
        }
    }
}
