//! pwalk - Parallel Filesystem Metadata Scanner
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use pwalk::config::{CliArgs, Command, WalkConfig};
use pwalk::output::read_records;
use pwalk::progress::{print_file_stats, print_header, print_summary, FileStats, ProgressReporter};
use pwalk::walker::WalkCoordinator;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    if let Some(Command::Stats { input, top }) = &args.command {
        return run_stats(input, *top);
    }

    let config = WalkConfig::from_args(args).context("Invalid configuration")?;

    run_scan(config)
}

fn run_scan(config: WalkConfig) -> Result<()> {
    if config.show_progress {
        print_header(
            &config.root,
            config.max_threads,
            &config.output_path,
            config.compression.is_enabled(),
        );
    }

    let show_progress = config.show_progress;
    let verbose = config.verbose;

    let coordinator = WalkCoordinator::new(config).context("Failed to initialize walker")?;

    let progress = if show_progress {
        Some(ProgressReporter::new())
    } else {
        None
    };

    let result = coordinator
        .run_with_progress(|p| {
            if let Some(ref reporter) = progress {
                reporter.update(p);
            }
        })
        .context("Walk failed")?;

    if let Some(ref p) = progress {
        if result.completed {
            p.finish("Walk completed");
        } else {
            p.finish("Walk stopped");
        }
    }

    if show_progress {
        print_summary(&result, verbose);
    }

    if !result.completed {
        warn!("Stall timeout reached; output is incomplete");
    }

    if !result.errors.is_empty() {
        info!(errors = result.errors.len(), "Walk completed with errors");
    }

    Ok(())
}

fn run_stats(input: &Path, top: usize) -> Result<()> {
    let records = read_records(input)
        .with_context(|| format!("Failed to read scan output '{}'", input.display()))?;

    let stats = FileStats::from_records(&records, top);
    print_file_stats(input, &stats);

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("pwalk=debug,warn")
    } else {
        EnvFilter::new("pwalk=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
