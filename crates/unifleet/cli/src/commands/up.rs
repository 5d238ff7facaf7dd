//! `unifleet up`

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::fleet::{default_target, Fleet};
use crate::loader;
use crate::output::{print_info, print_report, ConsoleSink};
use crate::signal::cancel_on_shutdown;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use unifleet_compose::{log_prefix, ReconcileConfig};

/// Arguments of `up`
#[derive(Debug, Args)]
pub struct UpArgs {
    /// Compose file to use instead of probing the working directory
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Do not follow service consoles after bringing the project up
    #[arg(short, long)]
    pub detach: bool,

    /// Exit with an error when any service fails
    #[arg(long)]
    pub strict: bool,
}

/// Execute `up`
pub async fn execute(args: UpArgs, config: &CliConfig) -> CliResult<()> {
    let workdir = std::env::current_dir()?;
    let project = loader::load_project(&workdir, args.file.as_deref(), &default_target(config))?;
    info!(project = %project.name, services = project.services.len(), "Loaded project");

    let fleet = Fleet::new(config);
    let width = project.longest_service_name();
    let prefixes: Vec<String> = project
        .services
        .iter()
        .map(|s| log_prefix(&s.name, width))
        .collect();
    let sink = Arc::new(ConsoleSink::new(prefixes.iter().map(String::as_str)));

    let reconcile = ReconcileConfig {
        follow_logs: !args.detach,
        strict: args.strict,
        ..ReconcileConfig::default()
    };
    let reconciler = fleet.reconciler(reconcile).with_log_sink(sink);

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());
    if !args.detach {
        print_info("Following service output (Ctrl+C to stop)");
    }

    let result = reconciler.up(project, cancel.clone()).await;
    cancel.cancel();

    let report = result?;
    print_report(&report);
    Ok(())
}
