//! HTTP routes.

use std::sync::Arc;

use axum::{routing::post, Router};

use crate::config::{RunnerSettings, StatusMode};
use crate::process::CommandExecutor;

pub mod script;

/// Immutable per-process state shared by every request.
#[derive(Debug)]
pub struct AppState {
    pub executor: CommandExecutor,
    pub status_mode: StatusMode,
    pub include_output_on_failure: bool,
}

impl AppState {
    pub fn from_settings(settings: &RunnerSettings) -> Self {
        Self {
            executor: CommandExecutor::new(&settings.script_path).with_timeout(settings.timeout),
            status_mode: settings.status_mode,
            include_output_on_failure: settings.include_output_on_failure,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/script/run-script", post(script::run_script))
        .with_state(Arc::new(state))
}
