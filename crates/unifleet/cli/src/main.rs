//! Unifleet CLI - Compose-style orchestration for unikernel fleets
//!
//! - `unifleet up`: bring the project in the working directory up
//! - `unifleet events`: follow machine state changes

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod duration;
mod error;
mod fleet;
mod loader;
mod output;
mod pidfile;
mod signal;

use commands::{events, up};
use config::CliConfig;
use error::CliResult;

/// Unifleet CLI application
#[derive(Parser)]
#[command(name = "unifleet")]
#[command(about = "Unifleet - compose-style orchestration for unikernel fleets", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "UNIFLEET_CONFIG")]
    config: Option<String>,

    /// Directory holding composite state
    #[arg(long, env = "UNIFLEET_STATE_DIR")]
    state_dir: Option<std::path::PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Create networks and machines for the project and follow their output
    Up(up::UpArgs),

    /// Follow machine state changes
    Events(events::EventsArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = Some(state_dir);
    }

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        cli.log_level.unwrap_or_else(|| config.log_level.clone())
    };
    init_tracing(&level, cli.json);

    match cli.command {
        Commands::Up(args) => up::execute(args, &config).await,
        Commands::Events(args) => events::execute(args, &config).await,
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
