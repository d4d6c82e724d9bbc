//! Concurrent open/truncate load with background process churn.
//!
//! Opener threads repeatedly open one shared file with
//! `O_CREAT|O_WRONLY|O_APPEND|O_TRUNC` and close it again. Spinner threads
//! keep short-lived `sleep` children running, so `SIGCHLD` keeps arriving
//! while the opens are in flight. Against a slowfs mount every open is a
//! delayed create, which is where an unhandled `EINTR` would show up.

use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Name of the file every opener hammers.
pub const STRESS_FILE_NAME: &str = "foo";

/// Default number of openers (and of spinners).
pub const DEFAULT_WORKERS: u16 = 64;

/// Argument passed to `sleep` by each spinner.
const SPINNER_SLEEP: &str = "0.1";

/// How often the coordinator checks whether to stop.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Failure observed by a worker.
#[derive(Debug, Error)]
pub enum StressError {
    #[error("open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("run sleep 0.1: {0}")]
    Spinner(#[source] io::Error),

    #[error("failed to spawn worker thread: {0}")]
    Thread(#[source] io::Error),
}

/// Workload parameters.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Directory holding the shared file.
    pub dir: PathBuf,
    /// Number of opener threads, and of spinner threads when enabled.
    pub workers: usize,
    /// Stop after this long. `None` runs until stopped or failed.
    pub duration: Option<Duration>,
    /// Whether to run spinner threads.
    pub spawn_children: bool,
    /// Stop everything on the first error.
    pub fail_fast: bool,
}

impl StressConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            workers: usize::from(DEFAULT_WORKERS),
            duration: None,
            spawn_children: true,
            fail_fast: true,
        }
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    #[must_use]
    pub fn spawn_children(mut self, spawn: bool) -> Self {
        self.spawn_children = spawn;
        self
    }

    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn target(&self) -> PathBuf {
        self.dir.join(STRESS_FILE_NAME)
    }
}

/// Result of a stress run.
#[derive(Debug)]
pub struct StressReport {
    /// Completed open/close cycles.
    pub iterations: u64,
    /// Failed opens plus failed spinner runs.
    pub errors: u64,
    /// Child processes run to completion.
    pub children: u64,
    /// The first failure, if any.
    pub first_error: Option<StressError>,
}

impl StressReport {
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

#[derive(Default)]
struct Shared {
    stop: AtomicBool,
    iterations: AtomicU64,
    errors: AtomicU64,
    children: AtomicU64,
    first_error: Mutex<Option<StressError>>,
}

impl Shared {
    fn record(&self, error: StressError, fail_fast: bool) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        debug!(error = %error, "stress worker error");
        let mut first = self.first_error.lock();
        if first.is_none() {
            *first = Some(error);
        }
        if fail_fast {
            self.stop.store(true, Ordering::SeqCst);
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Handle for stopping a run from another thread (e.g. a signal handler).
#[derive(Clone)]
pub struct StopHandle(Arc<Shared>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.stop.store(true, Ordering::SeqCst);
    }
}

/// A prepared stress run.
pub struct OpenStress {
    config: StressConfig,
    shared: Arc<Shared>,
}

impl OpenStress {
    pub fn new(config: StressConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.shared))
    }

    /// Runs the workload until the duration elapses, a stop is requested,
    /// or (with `fail_fast`) the first error occurs.
    pub fn run(self) -> Result<StressReport, StressError> {
        let target = self.config.target();
        info!(
            target = %target.display(),
            workers = self.config.workers,
            spawn_children = self.config.spawn_children,
            duration = ?self.config.duration,
            "Starting open stress"
        );

        let mut workers = Vec::new();
        let spawned = self.spawn_workers(&target, &mut workers);
        if let Err(e) = spawned {
            self.shared.stop.store(true, Ordering::SeqCst);
            join_all(workers);
            return Err(e);
        }

        let mut remaining = self.config.duration;
        while !self.shared.stopped() {
            let step = remaining.map_or(STOP_POLL_INTERVAL, |r| r.min(STOP_POLL_INTERVAL));
            thread::sleep(step);
            if let Some(r) = remaining.as_mut() {
                *r = r.saturating_sub(step);
                if r.is_zero() {
                    break;
                }
            }
        }
        self.shared.stop.store(true, Ordering::SeqCst);
        join_all(workers);

        let report = StressReport {
            iterations: self.shared.iterations.load(Ordering::Relaxed),
            errors: self.shared.errors.load(Ordering::Relaxed),
            children: self.shared.children.load(Ordering::Relaxed),
            first_error: self.shared.first_error.lock().take(),
        };
        info!(
            iterations = report.iterations,
            errors = report.errors,
            children = report.children,
            "Open stress finished"
        );
        Ok(report)
    }

    fn spawn_workers(
        &self,
        target: &Path,
        workers: &mut Vec<thread::JoinHandle<()>>,
    ) -> Result<(), StressError> {
        if self.config.spawn_children {
            for i in 0..self.config.workers {
                let shared = Arc::clone(&self.shared);
                let fail_fast = self.config.fail_fast;
                let handle = thread::Builder::new()
                    .name(format!("spinner-{i}"))
                    .spawn(move || spin_children(&shared, fail_fast))
                    .map_err(StressError::Thread)?;
                workers.push(handle);
            }
        }

        for i in 0..self.config.workers {
            let shared = Arc::clone(&self.shared);
            let fail_fast = self.config.fail_fast;
            let target = target.to_path_buf();
            let handle = thread::Builder::new()
                .name(format!("opener-{i}"))
                .spawn(move || open_loop(&shared, &target, fail_fast))
                .map_err(StressError::Thread)?;
            workers.push(handle);
        }
        Ok(())
    }
}

/// Convenience wrapper: prepare and run in one call.
pub fn run_open_stress(config: StressConfig) -> Result<StressReport, StressError> {
    OpenStress::new(config).run()
}

/// Opens `path` once the way the workload does, then closes it.
pub fn open_truncate_once(path: &Path) -> io::Result<()> {
    // std rejects append together with truncate, so O_TRUNC goes in raw
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .custom_flags(libc::O_TRUNC)
        .mode(0o600)
        .open(path)?;
    drop(file);
    Ok(())
}

fn open_loop(shared: &Shared, target: &Path, fail_fast: bool) {
    while !shared.stopped() {
        match open_truncate_once(target) {
            Ok(()) => {
                shared.iterations.fetch_add(1, Ordering::Relaxed);
            }
            Err(source) => shared.record(
                StressError::Open {
                    path: target.to_path_buf(),
                    source,
                },
                fail_fast,
            ),
        }
    }
}

fn spin_children(shared: &Shared, fail_fast: bool) {
    while !shared.stopped() {
        match Command::new("sleep").arg(SPINNER_SLEEP).status() {
            Ok(status) if status.success() => {
                shared.children.fetch_add(1, Ordering::Relaxed);
            }
            Ok(status) => shared.record(
                StressError::Spinner(io::Error::other(format!("exited with {status}"))),
                fail_fast,
            ),
            Err(e) => shared.record(StressError::Spinner(e), fail_fast),
        }
    }
}

fn join_all(workers: Vec<thread::JoinHandle<()>>) {
    for worker in workers {
        let _ = worker.join();
    }
}
