//! `unifleet events`

use crate::config::CliConfig;
use crate::duration::duration_arg;
use crate::error::CliResult;
use crate::fleet::Fleet;
use crate::output::{print_event, print_info};
use crate::pidfile::PidFile;
use crate::signal::cancel_on_shutdown;
use clap::Args;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use unifleet_drivers::AUTO_PLATFORM;
use unifleet_watch::{WatchConfig, Watcher};

/// Arguments of `events`
#[derive(Debug, Args)]
pub struct EventsArgs {
    /// Only follow the machine with this id or name
    pub machine: Option<String>,

    /// Interval between machine listings, e.g. 500ms, 2s, 1m
    #[arg(long, value_parser = duration_arg)]
    pub poll_granularity: Option<Duration>,

    /// Exit once every followed machine has stopped
    #[arg(short, long)]
    pub quit_together: bool,

    /// Platform driver to use
    #[arg(long = "plat", default_value = AUTO_PLATFORM)]
    pub platform: String,
}

/// Execute `events`
pub async fn execute(args: EventsArgs, config: &CliConfig) -> CliResult<()> {
    let fleet = Fleet::new(config);
    let platform = if args.platform.is_empty() {
        AUTO_PLATFORM
    } else {
        args.platform.as_str()
    };
    let driver = fleet.machines.get(platform)?;
    debug!(platform = %driver.platform(), "Selected platform driver");

    let pidfile = PidFile::acquire(&config.events_pidfile())?;
    if let Some(pidfile) = &pidfile {
        debug!(path = %pidfile.path().display(), "Holding pidfile");
    }

    let watch = WatchConfig::default()
        .with_filter(args.machine.unwrap_or_default())
        .with_poll_interval(
            args.poll_granularity
                .unwrap_or_else(|| config.poll_granularity()),
        )
        .with_quit_together(args.quit_together);
    let watcher = Watcher::new(driver, watch);

    let mut events = watcher.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(envelope) => print_event(&envelope),
                Err(RecvError::Lagged(missed)) => debug!(missed, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());
    if !args.quit_together {
        print_info("Watching machines... (Ctrl+C to stop)");
    }

    let result = watcher.watch(cancel.clone()).await;
    cancel.cancel();
    drop(watcher);
    let _ = printer.await;
    drop(pidfile);

    let summary = result?;
    info!(
        observed = summary.observed,
        released = summary.released,
        unobservable = summary.unobservable.len(),
        "Watch finished"
    );
    Ok(())
}
