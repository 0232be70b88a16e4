//! flowsheet CLI entry point.

use std::{process, str::FromStr};

use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};
use miette::Diagnostic as _;

use flowsheet_cli::{
    Args,
    error_adapter::{Reportable, diagnostics_to_reportables, to_reportables},
};

fn render(reportables: &[Reportable<'_>]) {
    let reporter = miette::GraphicalReportHandler::new();

    // Render each diagnostic independently
    for reportable in reportables {
        let mut writer = String::new();
        reporter
            .render_report(&mut writer, reportable)
            .expect("Writing to String buffer is infallible");

        match reportable.severity() {
            Some(miette::Severity::Warning) => warn!("{writer}"),
            _ => error!("{writer}"),
        }
    }
}

fn main() {
    // Install miette's pretty panic hook early for better panic reports
    miette::set_panic_hook();

    let args = Args::parse();

    // Initialize the logger with the specified log level
    let log_level = LevelFilter::from_str(&args.log_level).unwrap_or_else(|_| {
        eprintln!(
            "Invalid log level: {}. Using 'warn' instead.",
            args.log_level
        );
        LevelFilter::Warn
    });

    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(log_level)
        .init();

    info!(log_level:?; "Starting flowsheet");
    debug!(args:?; "Parsed arguments");

    match flowsheet_cli::run(&args) {
        Ok(session) => {
            render(&diagnostics_to_reportables(session.diagnostics()));
            if !session.is_valid() {
                process::exit(1);
            }
        }
        Err(err) => {
            render(&to_reportables(&err));
            process::exit(1);
        }
    }

    info!("Completed successfully");
}
