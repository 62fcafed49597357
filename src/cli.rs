use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::config::{RunnerSettings, StatusMode};

#[derive(Parser, Debug, Clone)]
#[command(name = "script-runner", about = "Run the deployment script over HTTP", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve `POST /script/run-script`.
    Serve(ServeArgs),
    /// Run the script once and print its output.
    Run(RunArgs),
}

/// Flags shared by every subcommand that executes the script.
#[derive(Args, Debug, Clone, Default)]
pub struct ExecArgs {
    /// Script to execute (overrides RUNNER_SCRIPT_PATH).
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Kill the script after this many seconds; 0 disables the limit.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Append captured output to non-zero exit messages.
    #[arg(long = "include-output-on-failure")]
    pub include_output_on_failure: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on (overrides RUNNER_BIND_ADDR).
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// How failures map onto HTTP status codes.
    #[arg(long = "status-mode", value_enum)]
    pub status_mode: Option<StatusMode>,

    #[command(flatten)]
    pub exec: ExecArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Project name passed as the first argument.
    #[arg(value_name = "PROJECT")]
    pub project: String,

    /// Group passed as the second argument.
    #[arg(value_name = "GROUP")]
    pub group: String,

    #[command(flatten)]
    pub exec: ExecArgs,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

impl ExecArgs {
    /// Layer these flags over settings resolved from file and environment.
    pub fn apply(&self, settings: &mut RunnerSettings) {
        if let Some(script) = &self.script {
            settings.script_path = script.clone();
        }
        if let Some(secs) = self.timeout {
            settings.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if self.include_output_on_failure {
            settings.include_output_on_failure = true;
        }
    }
}

impl ServeArgs {
    pub fn apply(&self, settings: &mut RunnerSettings) {
        if let Some(bind) = self.bind {
            settings.bind_addr = bind;
        }
        if let Some(mode) = self.status_mode {
            settings.status_mode = mode;
        }
        self.exec.apply(settings);
    }
}
