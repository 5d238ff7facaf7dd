//! Terminal output

use colored::*;
use std::collections::HashMap;
use unifleet_compose::{LogSink, ServiceOutcome, UpReport};
use unifleet_types::{EventSeverity, FleetEvent, FleetEventEnvelope};

const PALETTE: &[Color] = &[
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Blue,
];

/// Console sink coloring each service's prefix
pub struct ConsoleSink {
    colors: HashMap<String, Color>,
}

impl ConsoleSink {
    /// `prefixes` in service order; each gets the next palette color.
    pub fn new<'a>(prefixes: impl IntoIterator<Item = &'a str>) -> Self {
        let colors = prefixes
            .into_iter()
            .enumerate()
            .map(|(i, prefix)| (prefix.to_string(), PALETTE[i % PALETTE.len()]))
            .collect();
        Self { colors }
    }
}

impl LogSink for ConsoleSink {
    fn line(&self, prefix: &str, line: &str) {
        let color = self
            .colors
            .get(prefix)
            .copied()
            .unwrap_or(Color::White);
        println!("{} {} {}", prefix.color(color), "|".dimmed(), line);
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

/// Print the outcome of `up`
pub fn print_report(report: &UpReport) {
    for network in &report.networks_created {
        print_success(&format!("network {network} created"));
    }
    for failure in &report.networks_failed {
        print_error(&format!("network {}: {}", failure.network, failure.error));
    }
    for service in &report.services {
        match &service.outcome {
            ServiceOutcome::AlreadyRunning { machine_id } => {
                print_info(&format!("{} already running ({machine_id})", service.service))
            }
            ServiceOutcome::Launched {
                machine_id,
                artifact,
                state,
            } => print_success(&format!(
                "{} {state} from {artifact} ({machine_id})",
                service.service
            )),
            ServiceOutcome::Failed { error } => {
                print_error(&format!("{}: {error}", service.service))
            }
        }
    }
}

/// Print one watch event
pub fn print_event(envelope: &FleetEventEnvelope) {
    let severity = match envelope.severity {
        EventSeverity::Debug => "DEBUG".dimmed(),
        EventSeverity::Info => "INFO".blue(),
        EventSeverity::Warning => "WARN".yellow(),
        EventSeverity::Error => "ERROR".red(),
    };
    let time = envelope.timestamp.format("%H:%M:%S");

    let message = match &envelope.event {
        FleetEvent::ObservationStarted { machine_id, name } => {
            format!("{} ({machine_id}) observing", name.bold())
        }
        FleetEvent::StateChanged {
            machine_id,
            name,
            state,
        } => format!("{} ({machine_id}) {state}", name.bold()),
        FleetEvent::ObservationEnded {
            machine_id,
            name,
            reason,
        } => format!("{} ({machine_id}) released: {reason}", name.bold()),
        other => format!("{other:?}"),
    };

    println!("{} {} {}", time.to_string().dimmed(), severity, message);
}
