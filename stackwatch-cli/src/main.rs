mod commands;
mod dashboard;
mod logging;
mod ui;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use stackwatch_core::compose::ComposeRuntime;
use stackwatch_core::config::StackConfig;
use stackwatch_core::orchestrator::Orchestrator;
use stackwatch_core::probe::{NetProbe, Probe};
use stackwatch_core::runtime::StackRuntime;

const DEFAULT_REFRESH_SECS: f64 = 1.5;

#[derive(Parser)]
#[command(name = "stack")]
#[command(about = "Start, stop and watch the local dev stack", long_about = None)]
struct Cli {
    /// Stack file to use instead of searching for stack.yaml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the stack up and wait until every service is ready
    Start,
    /// Stop and remove the stack's containers
    Stop {
        /// Also remove named volumes
        #[arg(short, long)]
        volumes: bool,
    },
    /// One-shot readiness table
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Follow logs of one service, or of all of them
    Logs {
        service: Option<String>,
        #[arg(long, default_value_t = 200)]
        tail: usize,
    },
    /// Live dashboard
    Tui {
        /// Snapshot refresh interval in seconds (at least 0.5)
        #[arg(long, default_value_t = DEFAULT_REFRESH_SECS)]
        interval: f64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Tui {
        interval: DEFAULT_REFRESH_SECS,
    });

    let _log_guard = match &command {
        Commands::Tui { .. } => Some(logging::init_file()),
        _ => {
            logging::init_stderr();
            None
        }
    };

    match run(cli.config, command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\x1b[31m✗\x1b[0m {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<StackConfig> {
    if let Some(path) = explicit {
        let config = StackConfig::load(&path)
            .with_context(|| format!("could not load {}", path.display()))?;
        tracing::debug!(path = %path.display(), "using stack file");
        return Ok(config);
    }

    let cwd = std::env::current_dir().context("could not read the current directory")?;
    let (path, config) = StackConfig::discover(&cwd).context("could not load the stack file")?;
    match path {
        Some(path) => tracing::debug!(path = %path.display(), "using stack file"),
        None => tracing::debug!("no stack file found, using the built-in stack"),
    }
    Ok(config)
}

async fn run(config_path: Option<PathBuf>, command: Commands) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    let catalog = Arc::new(config.catalog());
    let runtime: Arc<dyn StackRuntime> = Arc::new(ComposeRuntime::new(
        config.compose.clone(),
        config.timing,
    ));
    let probe: Arc<dyn Probe> = Arc::new(NetProbe::new());
    let orchestrator = Orchestrator::new(
        runtime.clone(),
        probe.clone(),
        catalog.clone(),
        config.timing,
    );

    match command {
        Commands::Start => commands::start::run(&orchestrator).await,
        Commands::Stop { volumes } => commands::stop::run(&orchestrator, volumes).await,
        Commands::Status { json } => commands::status::run(&orchestrator, json).await,
        Commands::Tui { interval } => {
            let refresh = Duration::try_from_secs_f64(interval)
                .unwrap_or(dashboard::MIN_REFRESH)
                .max(dashboard::MIN_REFRESH);
            let options = dashboard::DashboardOptions {
                refresh,
                tail_lines: config.timing.tail_lines,
                probe_timeouts: config.timing.probe_timeouts(),
            };
            let code = dashboard::run(runtime, probe, catalog, options).await?;
            eprintln!("Dashboard log: {}", logging::log_file_path().display());
            Ok(code)
        }
        Commands::Logs { service, tail } => {
            commands::logs::run(runtime.as_ref(), service.as_deref(), tail).await
        }
    }
}
