//! `POST /script/run-script`: run the configured script for a project and group.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use super::AppState;
use crate::config::StatusMode;
use crate::execution::{ExecError, ExecutionRequest, ExecutionResult};

pub async fn run_script(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "rejected run-script request");
            return (
                StatusCode::BAD_REQUEST,
                format!("Invalid request: {}", rejection.body_text()),
            )
                .into_response();
        }
    };

    info!(project = %request.project_name, group = %request.group, "running script");
    // Run detached so a client that hangs up cannot cut the script short.
    let args = request.into_args();
    let task_state = Arc::clone(&state);
    let run = tokio::spawn(async move {
        let result = task_state.executor.execute(&args).await;
        match result.error() {
            None => info!("script finished"),
            Some(err) => warn!(error = %err, "script failed"),
        }
        result
    });
    let result = match run.await {
        Ok(result) => result,
        Err(err) => ExecutionResult::Failure(ExecError::launch(err)),
    };

    let status = status_for(state.status_mode, &result);
    (status, result.render(state.include_output_on_failure)).into_response()
}

pub fn status_for(mode: StatusMode, result: &ExecutionResult) -> StatusCode {
    match (mode, result.error()) {
        (StatusMode::Compat, _) | (StatusMode::Strict, None) => StatusCode::OK,
        (StatusMode::Strict, Some(ExecError::NonZeroExit { .. })) => StatusCode::BAD_GATEWAY,
        (StatusMode::Strict, Some(ExecError::Launch(_))) => StatusCode::INTERNAL_SERVER_ERROR,
        (StatusMode::Strict, Some(ExecError::TimedOut { .. })) => StatusCode::GATEWAY_TIMEOUT,
    }
}
