//! End-to-end runs through the public API with a scripted model and a real
//! interpreter sandbox (`sh` stands in for the configured interpreter).

use std::time::{Duration, Instant};

use coder::cancel::CancelSignal;
use coder::core::types::{Outcome, Stage};
use coder::cycle::{CancelReason, CycleController, CycleError, CycleRequest};
use coder::io::completion::Role;
use coder::io::config::{CoderConfig, SandboxConfig};
use coder::io::sandbox::InterpreterSandbox;
use coder::report::{Report, Status};
use coder::test_support::{ScriptedCompletion, ScriptedReply, fenced};

fn sh_config() -> CoderConfig {
    CoderConfig {
        sandbox: SandboxConfig {
            interpreter: "sh".to_string(),
            script_name: "main.sh".to_string(),
            timeout_secs: 5,
            ..SandboxConfig::default()
        },
        ..CoderConfig::default()
    }
}

fn controller(
    replies: Vec<ScriptedReply>,
) -> CycleController<ScriptedCompletion, InterpreterSandbox> {
    let config = sh_config();
    CycleController::from_config(
        ScriptedCompletion::new(replies),
        InterpreterSandbox::from_config(&config.sandbox),
        &config,
    )
}

fn approved(code: &str) -> Vec<ScriptedReply> {
    vec![
        fenced(code),
        ScriptedReply::text("VALID"),
        ScriptedReply::text("APPROVE"),
    ]
}

#[tokio::test]
async fn failing_script_is_repaired_with_its_own_error_output() {
    let mut replies = approved("echo 'starting up'\nmissing_command_7731\nexit 1");
    replies.extend(approved("echo 'all good here'"));
    let ctl = controller(replies);

    let run = ctl
        .run(&CycleRequest::new("say all good"), &CancelSignal::new())
        .await
        .expect("run");

    assert_eq!(run.outcome, Outcome::ExecutedSuccessfully);
    assert_eq!(run.iterations, 2);
    assert_eq!(run.artifact, "echo 'all good here'");
    let stages: Vec<Stage> = run.trace.iter().map(|r| r.stage).collect();
    assert_eq!(stages, vec![Stage::ExecutionFailed, Stage::Executed]);

    let repair_prompt = &ctl.completion().calls_for(Role::Generator)[1].prompt;
    assert!(repair_prompt.contains("starting up"));
    assert!(repair_prompt.contains("missing_command_7731"));
    assert!(repair_prompt.contains("[exit status:"));

    let report = Report::from_run(Ok(run));
    assert_eq!(report.status, Status::ExecutedSuccessfully);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn script_that_never_succeeds_exhausts_the_budget() {
    let mut replies = Vec::new();
    for attempt in 0..3 {
        replies.extend(approved(&format!("echo 'attempt {attempt}' >&2\nexit 2")));
    }
    let ctl = controller(replies);

    let run = ctl
        .run(&CycleRequest::new("anything"), &CancelSignal::new())
        .await
        .expect("run");

    assert_eq!(run.outcome, Outcome::BudgetExhausted);
    assert_eq!(run.iterations, 3);
    assert!(run.feedback.contains("attempt 2"));
    assert_eq!(ctl.completion().remaining(), 0);

    let report = Report::from_run(Ok(run));
    assert_eq!(report.status, Status::BudgetExhausted);
    assert!(report.artifact.is_some());
    assert!(report.message.expect("message").contains("attempt 2"));
}

#[tokio::test]
async fn cancellation_during_execution_kills_the_script() {
    let ctl = controller(approved("echo started\nexec sleep 10"));
    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = ctl
        .run(&CycleRequest::new("sleep"), &cancel)
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(err, CycleError::Cancelled { iteration: 1, .. }));
    assert_eq!(Report::from_run(Err(err)).exit_code(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_runs_on_one_controller_use_separate_sandbox_files() {
    // Every reply is this script, which carries both keywords, so it does not
    // matter how the two runs interleave on the shared reply queue. The script
    // fails if another run's marker file is visible in its directory.
    let script = "# VALID APPROVE\n\
                  if [ -e marker ]; then echo 'shared directory'; exit 1; fi\n\
                  echo taken > marker\n\
                  sleep 0.3\n\
                  echo finished";
    let ctl = controller(vec![ScriptedReply::text(script); 6]);
    let cancel = CancelSignal::new();
    let request = CycleRequest::new("write a marker file");

    let (a, b) = tokio::join!(ctl.run(&request, &cancel), ctl.run(&request, &cancel));
    let (a, b) = (a.expect("first"), b.expect("second"));
    for run in [&a, &b] {
        assert_eq!(run.outcome, Outcome::ExecutedSuccessfully);
        assert_eq!(run.iterations, 1);
        assert_eq!(run.artifact, script);
    }
    assert_eq!(ctl.completion().calls().len(), 6);
    assert_eq!(ctl.completion().remaining(), 0);
}

#[tokio::test]
async fn run_deadline_bounds_a_long_running_script() {
    let config = CoderConfig {
        run_timeout_secs: 1,
        sandbox: SandboxConfig {
            timeout_secs: 30,
            ..sh_config().sandbox
        },
        ..CoderConfig::default()
    };
    let ctl = CycleController::from_config(
        ScriptedCompletion::new(approved("sleep 20 &\nwhile true; do :; done")),
        InterpreterSandbox::from_config(&config.sandbox),
        &config,
    );

    let started = Instant::now();
    let err = ctl
        .run(&CycleRequest::new("spin"), &CancelSignal::new())
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(matches!(
        err,
        CycleError::Cancelled {
            reason: CancelReason::Deadline,
            ..
        }
    ));
}
