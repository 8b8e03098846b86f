//! dupetree - duplicate file and directory finder
//!
//! Files are grouped by size, then narrowed by three hashing passes of
//! increasing cost. Confirmed duplicates annotate a filesystem tree; a
//! directory whose every entry is a duplicate is reported as one unit
//! instead of as its individual files.
//!
//! The pipeline is driven by [`duplicates::DuplicateFinder`]; [`run_app`]
//! wires it to the command line.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod events;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;
pub mod stats;
pub mod tree;

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::Context;

use crate::cli::{Cli, Commands, OutputFormat, ScanArgs};
use crate::config::Config;
use crate::duplicates::DuplicateFinder;
use crate::error::ExitCode;
use crate::events::{EventBus, LogSink};
use crate::output::{JsonOutput, TextOutput};
use crate::progress::Progress;
use crate::stats::StageStatistics;

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns an error for invalid configuration, invalid roots, an
/// interrupted scan or a failure to write the results.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Scan(args) => {
            config.apply_scan_args(&args);
            run_scan(&args, &config, cli.quiet)
        }
    }
}

fn run_scan(args: &ScanArgs, config: &Config, quiet: bool) -> anyhow::Result<ExitCode> {
    let handler = signal::install_handler()?;

    let bus = Arc::new(EventBus::new());
    bus.add_subscriber(Arc::new(LogSink));

    let show_progress =
        args.progress || (!quiet && !args.no_progress && io::stderr().is_terminal());
    let progress = show_progress.then(|| Arc::new(Progress::new()));
    if let Some(progress) = &progress {
        bus.add_subscriber(progress.clone());
    }

    let stats = Arc::new(StageStatistics::new());
    let finder_config = config
        .finder_config()
        .context("Invalid configuration")?
        .with_event_sink(bus)
        .with_stats_collector(stats.clone())
        .with_shutdown_flag(handler.get_flag());

    let finder = DuplicateFinder::new(finder_config);
    let result = finder.find_duplicates(&args.roots);
    if let Some(progress) = &progress {
        progress.finish();
    }
    let (map, summary) = result?;

    let exit_code = ExitCode::for_scan(map.len(), summary.skipped_items);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Text => TextOutput::new(&map, &summary).write_to(&mut out)?,
        OutputFormat::Json => JsonOutput::new(&map, &summary, exit_code).write_to(&mut out, true)?,
    }
    out.flush()?;

    if args.stats {
        eprint!("{}", stats.render_table());
    }

    log::debug!("Exiting with {:?}", exit_code);
    Ok(exit_code)
}
