#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use slowfs::{exit_code, logging};
use slowfs_probe::{OpenStress, StressConfig};

/// Open and truncate one file from many threads while child processes churn
#[derive(Parser)]
#[command(name = "open-stress")]
#[command(author, version)]
struct Cli {
    /// Directory in which to create files
    #[arg(long, value_name = "DIR")]
    dir: PathBuf,

    /// Number of opener threads (and of child-spawning threads)
    #[arg(
        long,
        default_value_t = slowfs_probe::stress::DEFAULT_WORKERS,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    workers: u16,

    /// Stop after this long and print a report (default: run until killed)
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Do not spawn `sleep` child processes
    #[arg(long)]
    no_children: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code::GENERAL_ERROR)
        }
    }
}

fn run() -> Result<u8> {
    let cli = Cli::parse();
    logging::setup_tracing(cli.verbose);

    eprintln!("My PID: {}", std::process::id());

    let mut config = StressConfig::new(&cli.dir)
        .workers(usize::from(cli.workers))
        .spawn_children(!cli.no_children)
        .fail_fast(cli.duration.is_none());
    if let Some(duration) = cli.duration {
        config = config.duration(duration);
    }

    let stress = OpenStress::new(config);
    let stop = stress.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("Failed to set signal handler")?;

    let report = stress.run().context("Failed to start workers")?;

    if let Some(first) = &report.first_error {
        error!("{first}");
    }
    println!("iterations={} errors={}", report.iterations, report.errors);
    info!(children = report.children, "done");

    Ok(if report.is_clean() {
        exit_code::SUCCESS
    } else {
        exit_code::GENERAL_ERROR
    })
}
