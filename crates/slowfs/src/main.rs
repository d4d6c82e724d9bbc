#![deny(unsafe_code)]

// Use mimalloc for reduced allocation latency (enabled by default).
// Disable with `--no-default-features` if debugging allocator issues.
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use slowfs::{exit_code, logging, MountError, ServerConfig};

/// Mount a filesystem whose file creation is deliberately slow
#[derive(Parser)]
#[command(name = "slowfs")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Mount on a temporary directory with the default 1s delay
    slowfs -v

    # Mount on an existing directory with a shorter delay
    slowfs --delay 250ms /mnt/slow

    # Reproduce an interrupted open against the mount
    interrupt-open --signal 30 /mnt/slow
")]
struct Cli {
    /// Delay applied to every create request (e.g. 1s, 250ms)
    #[arg(
        long,
        env = "SLOWFS_DELAY",
        default_value = "1s",
        value_parser = humantime::parse_duration
    )]
    delay: Duration,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory to mount on (default: a fresh temporary directory)
    #[arg(value_name = "MOUNTPOINT")]
    mountpoint: Option<PathBuf>,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_tracing(cli.verbose);

    info!(pid = std::process::id(), delay = ?cli.delay, "slowfs starting");

    // Keep the temporary directory alive until after teardown
    let (mountpoint, _scratch) = match cli.mountpoint {
        Some(path) => (path, None),
        None => {
            let dir = tempfile::Builder::new()
                .prefix("slowfs")
                .tempdir()
                .context("Failed to create temporary mount point")?;
            (dir.path().to_path_buf(), Some(dir))
        }
    };

    let (tx, rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to set signal handler")?;

    let mut handle = slowfs::mount(&mountpoint, ServerConfig::with_delay(cli.delay))
        .with_context(|| format!("Failed to mount {}", mountpoint.display()))?;

    eprintln!("Ready: {}", mountpoint.display());

    match rx.recv() {
        Ok(()) => info!("Received interrupt signal, unmounting..."),
        Err(_) => warn!("Signal channel closed unexpectedly"),
    }

    match handle.unmount() {
        Ok(()) => {
            if let Err(e) = handle.join() {
                error!(error = %e, "Join failed");
            }
        }
        Err(e) => error!(error = %e, "Unmount failed"),
    }

    let stats = handle.snapshot();
    info!(
        allocated = handle.server().allocator().allocated(),
        completed = stats.completed,
        interrupted = stats.interrupted,
        "slowfs stopped"
    );
    drop(handle);
    Ok(())
}

/// Categorize an error into an exit code using typed error downcasting.
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.chain().any(|cause| cause.downcast_ref::<MountError>().is_some()) {
        return exit_code::MOUNT_FAILED;
    }
    exit_code::GENERAL_ERROR
}
