//! Execution model: request payload, result and failure taxonomy.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inbound payload for a single script run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub project_name: String,
    pub group: String,
}

impl ExecutionRequest {
    pub fn new(project_name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            group: group.into(),
        }
    }

    /// Positional arguments handed to the script, in order.
    pub fn into_args(self) -> Vec<String> {
        vec![self.project_name, self.group]
    }
}

/// Why a run did not succeed. `Display` yields the exact text returned to callers.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The child ran to completion but reported a non-zero status.
    #[error("Script execution failed with exit code {code}")]
    NonZeroExit { code: i32, output: String },
    /// Spawning, reading from or waiting on the child failed.
    #[error("Script execution failed: {0}")]
    Launch(String),
    /// The configured deadline elapsed and the child was killed.
    #[error("Script execution failed: timed out after {}s", .after.as_secs_f64())]
    TimedOut { after: Duration },
}

impl ExecError {
    pub fn launch(err: impl std::fmt::Display) -> Self {
        Self::Launch(err.to_string())
    }
}

#[derive(Debug)]
pub enum ExecutionResult {
    Success { output: String },
    Failure(ExecError),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error(&self) -> Option<&ExecError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(err) => Some(err),
        }
    }

    /// Text body for this result.
    ///
    /// Output captured before a non-zero exit is dropped unless
    /// `include_output_on_failure` is set, in which case it follows the
    /// failure line.
    pub fn render(&self, include_output_on_failure: bool) -> String {
        match self {
            Self::Success { output } => output.clone(),
            Self::Failure(err @ ExecError::NonZeroExit { output, .. })
                if include_output_on_failure && !output.is_empty() =>
            {
                format!("{}\n{}", err, output)
            }
            Self::Failure(err) => err.to_string(),
        }
    }
}

impl From<Result<String, ExecError>> for ExecutionResult {
    fn from(value: Result<String, ExecError>) -> Self {
        match value {
            Ok(output) => Self::Success { output },
            Err(err) => Self::Failure(err),
        }
    }
}
