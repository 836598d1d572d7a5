//! HTTP route handlers.

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{info, warn};

use coder::cancel::CancelSignal;
use coder::cycle::CycleRequest;
use coder::io::completion::CompletionService;
use coder::io::sandbox::Sandbox;
use coder::report::{Report, Status};

use crate::state::AppState;

/// Build the router: the flow endpoint plus the `/api` health check.
pub fn router<C, S>(state: AppState<C, S>) -> Router
where
    C: CompletionService + 'static,
    S: Sandbox + 'static,
{
    Router::new()
        .route("/codingFlow", post(coding_flow::<C, S>))
        .nest("/api", Router::new().route("/health", get(health)))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct FlowRequest {
    /// The task description.
    pub data: String,
}

/// POST /codingFlow - run one cycle and return the report.
///
/// Dropping the request (client disconnect) cancels the run, including any
/// sandbox process it started.
async fn coding_flow<C, S>(
    State(state): State<AppState<C, S>>,
    payload: Result<Json<FlowRequest>, JsonRejection>,
) -> (StatusCode, Json<Report>)
where
    C: CompletionService + 'static,
    S: Sandbox + 'static,
{
    let request = match payload {
        Ok(Json(body)) => CycleRequest::new(body.data),
        Err(rejection) => {
            warn!(err = %rejection, "rejected flow request body");
            let report = Report {
                status: Status::ValidationError,
                artifact: None,
                message: Some(rejection.body_text()),
                iterations: 0,
            };
            return (StatusCode::BAD_REQUEST, Json(report));
        }
    };

    let cancel = CancelSignal::new();
    let guard = cancel.cancel_on_drop();
    let result = state.controller.run(&request, &cancel).await;
    guard.disarm();

    let report = Report::from_run(result);
    info!(
        status = report.status.as_str(),
        iterations = report.iterations,
        "flow finished"
    );
    (status_code(report.status), Json(report))
}

fn status_code(status: Status) -> StatusCode {
    match status {
        Status::ExecutedSuccessfully | Status::ApprovedNotExecuted | Status::BudgetExhausted => {
            StatusCode::OK
        }
        Status::ValidationError => StatusCode::BAD_REQUEST,
        Status::ServiceError => StatusCode::BAD_GATEWAY,
        Status::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        Status::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coder::cycle::CycleController;
    use coder::io::config::CoderConfig;
    use coder::test_support::{
        SAMPLE_CODE, ScriptedCompletion, ScriptedReply, ScriptedSandbox, approved_iteration,
    };

    type TestState = AppState<ScriptedCompletion, ScriptedSandbox>;

    fn state_with(replies: Vec<ScriptedReply>, config: &CoderConfig) -> TestState {
        AppState::new(CycleController::from_config(
            ScriptedCompletion::new(replies),
            ScriptedSandbox::new(vec![ScriptedSandbox::succeeding("55\n")]),
            config,
        ))
    }

    async fn post_task(state: &TestState, data: &str) -> (StatusCode, Report) {
        let body = FlowRequest {
            data: data.to_string(),
        };
        let (status, Json(report)) = coding_flow(State(state.clone()), Ok(Json(body))).await;
        (status, report)
    }

    #[tokio::test]
    async fn health_is_ok() {
        assert_eq!(health().await, "ok");
    }

    #[tokio::test]
    async fn successful_flow_returns_artifact() {
        let state = state_with(approved_iteration(SAMPLE_CODE), &CoderConfig::default());
        let (status, report) = post_task(&state, "fibonacci").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, Status::ExecutedSuccessfully);
        assert_eq!(report.artifact.as_deref(), Some(SAMPLE_CODE));
        assert_eq!(report.iterations, 1);
    }

    #[tokio::test]
    async fn exhausted_budget_is_still_ok() {
        let replies = (0..3)
            .flat_map(|_| {
                [
                    ScriptedReply::text(SAMPLE_CODE),
                    ScriptedReply::text("undefined variable"),
                ]
            })
            .collect();
        let state = state_with(replies, &CoderConfig::default());
        let (status, report) = post_task(&state, "fibonacci").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, Status::BudgetExhausted);
        assert!(report.artifact.is_some());
    }

    #[tokio::test]
    async fn empty_task_is_bad_request() {
        let state = state_with(Vec::new(), &CoderConfig::default());
        let (status, report) = post_task(&state, "  ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(report.status, Status::ValidationError);
        assert!(state.controller.completion().calls().is_empty());
    }

    #[tokio::test]
    async fn completion_failure_is_bad_gateway() {
        let state = state_with(
            vec![ScriptedReply::Fail("connection refused".to_string())],
            &CoderConfig::default(),
        );
        let (status, report) = post_task(&state, "fibonacci").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(report.status, Status::ServiceError);
        assert_eq!(report.artifact, None);
    }

    #[tokio::test]
    async fn run_deadline_is_service_unavailable() {
        let config = CoderConfig {
            run_timeout_secs: 1,
            ..CoderConfig::default()
        };
        let state = state_with(vec![ScriptedReply::Hang], &config);
        let (status, report) = post_task(&state, "fibonacci").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, Status::Cancelled);
    }

    #[test]
    fn status_codes_cover_every_status() {
        assert_eq!(status_code(Status::ApprovedNotExecuted), StatusCode::OK);
        assert_eq!(
            status_code(Status::InternalError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn report_body_uses_result_key() {
        let body: FlowRequest = serde_json::from_str(r#"{"data": "fibonacci"}"#).expect("parse");
        assert_eq!(body.data, "fibonacci");

        let report = Report {
            status: Status::ExecutedSuccessfully,
            artifact: Some("print(1)".to_string()),
            message: None,
            iterations: 1,
        };
        let value = serde_json::to_value(&report).expect("json");
        assert_eq!(value["result"], "print(1)");
        assert_eq!(value["status"], "executed_successfully");
    }
}
