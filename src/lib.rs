//! HTTP front for a fixed deployment script.
//!
//! Each `POST /script/run-script` spawns the configured script with the
//! request's project name and group as its two arguments and answers with
//! whatever the script wrote to stdout and stderr.

pub mod cli;
pub mod config;
pub mod execution;
pub mod handlers;
pub mod process;

use std::future::Future;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use handlers::AppState;

/// Serve the run-script route on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("reading listener address")?;
    info!(
        %addr,
        script = %state.executor.program().display(),
        timeout_secs = state.executor.timeout().map(|d| d.as_secs_f64()),
        status_mode = ?state.status_mode,
        "listening"
    );
    axum::serve(listener, handlers::router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")
}
