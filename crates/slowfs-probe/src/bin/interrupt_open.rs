//! Start an open(2) on a file in the given directory, then optionally deliver
//! a signal to the own process and report what the open returned.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;

use slowfs::{exit_code, logging};
use slowfs_probe::probe::parse_signal;
use slowfs_probe::{run_probe, CreateMode, ProbeConfig};

/// Race one file creation against a signal
#[derive(Parser)]
#[command(name = "interrupt-open")]
#[command(author, version)]
struct Cli {
    /// Signal number to deliver (0 means no signal)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    signal: i32,

    /// Delay before the signal is delivered
    #[arg(long, default_value = "200ms", value_parser = humantime::parse_duration)]
    after: Duration,

    /// Install the handler with SA_RESTART
    #[arg(long)]
    restart: bool,

    /// Create with std::fs::File::create, which retries on EINTR
    #[arg(long)]
    retry: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory in which to create `some_file`
    #[arg(value_name = "DIR")]
    dir: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_tracing(cli.verbose);

    eprintln!("My PID: {}", std::process::id());

    let signal = match parse_signal(cli.signal) {
        Ok(signal) => signal,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Usage: interrupt-open [--signal N] [--after DURATION] DIR");
            return ExitCode::from(exit_code::USAGE_ERROR);
        }
    };

    let config = ProbeConfig::new(cli.dir)
        .signal(signal)
        .after(cli.after)
        .restart(cli.restart)
        .mode(if cli.retry {
            CreateMode::Retry
        } else {
            CreateMode::Once
        });

    match run_probe(&config) {
        Ok(outcome) => {
            eprintln!("{outcome}");
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            error!("{e}");
            ExitCode::from(exit_code::GENERAL_ERROR)
        }
    }
}
