use std::process::ExitCode;

use anyhow::{Context, Result};
use script_runner::{
    cli::{Cli, Command},
    config::{Config, RunnerSettings},
    execution::ExecutionRequest,
    handlers::AppState,
    process::CommandExecutor,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    // Defaults, then rc file, then environment; CLI flags are applied per subcommand.
    let cfg = Config::load();
    let mut settings = RunnerSettings::from_config(&cfg).with_context(|| {
        format!("invalid configuration (rc file: {})", cfg.config_path.display())
    })?;

    match args.command {
        Command::Serve(serve) => {
            serve.apply(&mut settings);
            let listener = TcpListener::bind(settings.bind_addr)
                .await
                .with_context(|| format!("binding {}", settings.bind_addr))?;
            script_runner::serve(listener, AppState::from_settings(&settings), shutdown_signal())
                .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(run) => {
            run.exec.apply(&mut settings);
            let executor =
                CommandExecutor::new(&settings.script_path).with_timeout(settings.timeout);
            let request = ExecutionRequest::new(run.project, run.group);
            let result = executor.execute(&request.into_args()).await;
            let body = result.render(settings.include_output_on_failure);
            if result.is_success() {
                print!("{}", body);
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("{}", body);
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
