//! Race one file creation against a signal delivered to the own process.
//!
//! The create runs on a worker thread. The calling thread blocks the signal
//! for itself, waits, then sends the signal to the whole process, so the
//! kernel can only deliver it to the thread that is inside `open(2)`.
//!
//! A no-op handler is installed first. Without `SA_RESTART` an interrupted
//! `open` returns `EINTR`; with it the kernel restarts the call.

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::signal::{kill, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::stat::Mode;
use nix::unistd::Pid;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Name of the file the probe creates.
pub const PROBE_FILE_NAME: &str = "some_file";

/// Default pause before the signal is sent.
pub const DEFAULT_SIGNAL_DELAY: Duration = Duration::from_millis(200);

/// Errors that prevent the probe from running at all.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid signal number {0}")]
    InvalidSignal(i32),

    #[error("failed to install handler for {signal}: {source}")]
    Handler {
        signal: Signal,
        #[source]
        source: Errno,
    },

    #[error("failed to deliver {signal}: {source}")]
    Deliver {
        signal: Signal,
        #[source]
        source: Errno,
    },

    #[error("failed to block {signal} on the signalling thread: {source}")]
    Mask {
        signal: Signal,
        #[source]
        source: Errno,
    },

    #[error("create thread failed: {0}")]
    Thread(String),
}

/// Parses a signal number. `0` means no signal.
pub fn parse_signal(number: i32) -> Result<Option<Signal>, ProbeError> {
    if number == 0 {
        return Ok(None);
    }
    Signal::try_from(number)
        .map(Some)
        .map_err(|_| ProbeError::InvalidSignal(number))
}

/// How the create is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateMode {
    /// A single raw `open(2)`, so `EINTR` reaches the caller.
    #[default]
    Once,
    /// `std::fs::File::create`, which retries on `EINTR`.
    Retry,
}

/// Probe parameters.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub dir: PathBuf,
    pub signal: Option<Signal>,
    pub after: Duration,
    pub restart: bool,
    pub mode: CreateMode,
}

impl ProbeConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            signal: None,
            after: DEFAULT_SIGNAL_DELAY,
            restart: false,
            mode: CreateMode::default(),
        }
    }

    #[must_use]
    pub fn signal(mut self, signal: Option<Signal>) -> Self {
        self.signal = signal;
        self
    }

    #[must_use]
    pub fn after(mut self, after: Duration) -> Self {
        self.after = after;
        self
    }

    #[must_use]
    pub fn restart(mut self, restart: bool) -> Self {
        self.restart = restart;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: CreateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn target(&self) -> PathBuf {
        self.dir.join(PROBE_FILE_NAME)
    }
}

/// What the create call returned.
#[derive(Debug)]
pub enum ProbeOutcome {
    Created,
    Interrupted,
    Failed(io::Error),
}

impl ProbeOutcome {
    pub fn from_result(result: io::Result<()>) -> Self {
        match result {
            Ok(()) => ProbeOutcome::Created,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => ProbeOutcome::Interrupted,
            Err(e) => ProbeOutcome::Failed(e),
        }
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            ProbeOutcome::Created => slowfs::exit_code::SUCCESS,
            ProbeOutcome::Failed(_) => slowfs::exit_code::GENERAL_ERROR,
            ProbeOutcome::Interrupted => slowfs::exit_code::CANCELLED,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Created => f.write_str("Create error: <nil>"),
            ProbeOutcome::Interrupted => {
                write!(f, "Create error: {}", io::Error::from_raw_os_error(libc::EINTR))
            }
            ProbeOutcome::Failed(e) => write!(f, "Create error: {e}"),
        }
    }
}

extern "C" fn noop_handler(_: libc::c_int) {}

/// Installs a handler that does nothing, so `signal` cannot kill the process.
pub fn install_noop_handler(signal: Signal, restart: bool) -> Result<(), ProbeError> {
    let flags = if restart {
        SaFlags::SA_RESTART
    } else {
        SaFlags::empty()
    };
    let action = SigAction::new(SigHandler::Handler(noop_handler), flags, SigSet::empty());
    // SAFETY: the handler is async-signal-safe (it does nothing).
    unsafe { sigaction(signal, &action) }
        .map(drop)
        .map_err(|source| ProbeError::Handler { signal, source })
}

/// Creates `path` once, as configured.
pub fn create_file(path: &Path, mode: CreateMode) -> io::Result<()> {
    match mode {
        CreateMode::Once => {
            let flags = OFlag::O_CREAT | OFlag::O_WRONLY | OFlag::O_TRUNC | OFlag::O_CLOEXEC;
            open(path, flags, Mode::from_bits_truncate(0o666))
                .map(drop)
                .map_err(io::Error::from)
        }
        CreateMode::Retry => std::fs::File::create(path).map(drop),
    }
}

/// Runs the probe to completion.
pub fn run_probe(config: &ProbeConfig) -> Result<ProbeOutcome, ProbeError> {
    if let Some(signal) = config.signal {
        install_noop_handler(signal, config.restart)?;
    }

    let target = config.target();
    info!(path = %target.display(), mode = ?config.mode, "Opening");

    // Spawned before the signal is blocked below, so this thread keeps it unblocked
    let (tx, rx) = mpsc::channel();
    let mode = config.mode;
    let creator = thread::Builder::new()
        .name("create".to_string())
        .spawn(move || {
            let _ = tx.send(create_file(&target, mode));
        })
        .map_err(|e| ProbeError::Thread(e.to_string()))?;

    let result = match config.signal {
        None => rx.recv(),
        Some(signal) => match rx.recv_timeout(config.after) {
            Ok(result) => {
                debug!("Create finished before the signal was due");
                Ok(result)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(mpsc::RecvError),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let mut mask = SigSet::empty();
                mask.add(signal);
                mask.thread_block()
                    .map_err(|source| ProbeError::Mask { signal, source })?;

                info!(signal = %signal, "Delivering signal");
                kill(Pid::this(), signal).map_err(|source| ProbeError::Deliver { signal, source })?;
                rx.recv()
            }
        },
    };

    let _ = creator.join();
    let result = result
        .map_err(|_| ProbeError::Thread("create thread exited without a result".to_string()))?;
    Ok(ProbeOutcome::from_result(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal() {
        assert_eq!(parse_signal(0).unwrap(), None);
        assert_eq!(parse_signal(libc::SIGUSR1).unwrap(), Some(Signal::SIGUSR1));
        assert!(matches!(parse_signal(-1), Err(ProbeError::InvalidSignal(-1))));
        assert!(matches!(parse_signal(1000), Err(ProbeError::InvalidSignal(1000))));
    }

    #[test]
    fn test_outcome_classification() {
        assert!(matches!(ProbeOutcome::from_result(Ok(())), ProbeOutcome::Created));
        assert!(matches!(
            ProbeOutcome::from_result(Err(io::Error::from_raw_os_error(libc::EINTR))),
            ProbeOutcome::Interrupted
        ));
        assert!(matches!(
            ProbeOutcome::from_result(Err(io::Error::from_raw_os_error(libc::ENOENT))),
            ProbeOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(ProbeOutcome::Created.exit_code(), 0);
        assert_eq!(ProbeOutcome::Failed(io::Error::other("x")).exit_code(), 1);
        assert_eq!(ProbeOutcome::Interrupted.exit_code(), 8);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ProbeOutcome::Created.to_string(), "Create error: <nil>");
        assert!(ProbeOutcome::Interrupted.to_string().starts_with("Create error: "));
        let failed = ProbeOutcome::Failed(io::Error::from_raw_os_error(libc::ENOENT));
        assert!(failed.to_string().contains("No such file or directory"));
    }

    #[test]
    fn test_create_file_in_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROBE_FILE_NAME);
        create_file(&path, CreateMode::Once).unwrap();
        assert!(path.exists());
        create_file(&path, CreateMode::Retry).unwrap();
    }

    #[test]
    fn test_probe_without_signal() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_probe(&ProbeConfig::new(dir.path())).unwrap();
        assert!(matches!(outcome, ProbeOutcome::Created));
        assert!(dir.path().join(PROBE_FILE_NAME).exists());
    }

    #[test]
    fn test_probe_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_probe(&ProbeConfig::new(dir.path().join("missing"))).unwrap();
        assert!(matches!(
            outcome,
            ProbeOutcome::Failed(ref e) if e.kind() == io::ErrorKind::NotFound
        ));
    }
}
