//! Scripted collaborators for driving the cycle controller in tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::io::completion::{CompletionError, CompletionRequest, CompletionService, Role};
use crate::io::sandbox::{Execution, ExecutionLimits, Sandbox};

/// Artifact long enough to pass the minimum-length check.
pub const SAMPLE_CODE: &str = "def fib(n):\n    a, b = 0, 1\n    for _ in range(n):\n        a, b = b, a + b\n    return a\n\nprint(fib(10))";

/// One scripted completion-service reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Fail with a transport error carrying this message.
    Fail(String),
    /// Never resolve (for cancellation tests).
    Hang,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }
}

/// Completion service that replays a fixed queue of replies and records every request.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// All requests received so far, in order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_for(&self, role: Role) -> Vec<CompletionRequest> {
        self.calls()
            .into_iter()
            .filter(|call| call.role == role)
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("replies lock").len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.calls.lock().expect("calls lock").push(request.clone());
        let reply = self.replies.lock().expect("replies lock").pop_front();
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(message)) => Err(CompletionError::Transport(message)),
            Some(ScriptedReply::Hang) => std::future::pending().await,
            None => Err(CompletionError::Transport(format!(
                "no scripted reply for {} call",
                request.role.as_str()
            ))),
        }
    }
}

/// Sandbox that replays a fixed queue of executions and records every artifact.
#[derive(Debug, Default)]
pub struct ScriptedSandbox {
    executions: Mutex<VecDeque<Execution>>,
    artifacts: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    pub fn new(executions: Vec<Execution>) -> Self {
        Self {
            executions: Mutex::new(executions.into()),
            artifacts: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(output: &str) -> Execution {
        Execution {
            output: output.to_string(),
            success: true,
            cancelled: false,
        }
    }

    pub fn failing(output: &str) -> Execution {
        Execution::failed(output)
    }

    /// Artifacts passed to `execute`, in order.
    pub fn artifacts(&self) -> Vec<String> {
        self.artifacts.lock().expect("artifacts lock").clone()
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn execute(
        &self,
        artifact: &str,
        _limits: ExecutionLimits,
        _cancel: &CancelSignal,
    ) -> Execution {
        self.artifacts
            .lock()
            .expect("artifacts lock")
            .push(artifact.to_string());
        self.executions
            .lock()
            .expect("executions lock")
            .pop_front()
            .unwrap_or_else(|| Execution::failed("no scripted execution"))
    }
}

/// Generator reply wrapping `code` in a python fence.
pub fn fenced(code: &str) -> ScriptedReply {
    ScriptedReply::text(format!("```python\n{code}\n```"))
}

/// One full approved iteration: generation, `VALID`, `APPROVE`.
pub fn approved_iteration(code: &str) -> Vec<ScriptedReply> {
    vec![
        fenced(code),
        ScriptedReply::text("VALID"),
        ScriptedReply::text("APPROVE"),
    ]
}
