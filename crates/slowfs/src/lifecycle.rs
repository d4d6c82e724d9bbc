//! Mounting, unmounting and draining a [`SlowFs`] instance.
//!
//! A mount moves through an explicit state machine:
//!
//! ```text
//! Unmounted --mount--> Mounted --unmount--> Draining --join--> Unmounted
//! ```
//!
//! Every other step is rejected with [`MountError::InvalidTransition`]. In
//! particular `join` on a handle that is still mounted fails immediately
//! instead of blocking until someone else unmounts.

use crate::config::{MountOptions, ServerConfig};
use crate::error::MountError;
use crate::filesystem::SlowFuse;
use crate::identity::ProcessIdentity;
use crate::requests::{RequestStatsSnapshot, RequestTracker};
use crate::server::SlowFs;
use fuser::{BackgroundSession, MountOption};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Timeout for the session join performed when a handle is dropped.
/// The join thread may leak on timeout, which beats blocking forever.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on each stat issued while waiting for the mount to come up.
const STAT_TIMEOUT: Duration = Duration::from_millis(500);

/// Lifecycle state of a [`MountHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountState {
    Unmounted,
    Mounted,
    /// Detached from the namespace, session and requests still finishing.
    Draining,
}

impl MountState {
    /// Whether `self -> to` is a legal step.
    pub fn can_transition_to(self, to: MountState) -> bool {
        matches!(
            (self, to),
            (MountState::Unmounted, MountState::Mounted)
                | (MountState::Mounted, MountState::Draining)
                | (MountState::Draining, MountState::Unmounted)
        )
    }
}

impl fmt::Display for MountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MountState::Unmounted => "unmounted",
            MountState::Mounted => "mounted",
            MountState::Draining => "draining",
        };
        f.write_str(name)
    }
}

/// Mounts a new server at `target` with default mount options.
pub fn mount(target: impl AsRef<Path>, config: ServerConfig) -> Result<MountHandle, MountError> {
    mount_with_options(target, config, &MountOptions::default())
}

/// Mounts a new server at `target`.
///
/// Returns once the mount is visible in the namespace. Does not wait for
/// teardown.
pub fn mount_with_options(
    target: impl AsRef<Path>,
    config: ServerConfig,
    options: &MountOptions,
) -> Result<MountHandle, MountError> {
    let target = target.as_ref();
    if !target.is_dir() {
        return Err(MountError::NotADirectory(target.to_path_buf()));
    }

    info!(
        mountpoint = %target.display(),
        delay_ms = config.create_delay.as_millis(),
        "Starting FUSE mount"
    );

    let owner = ProcessIdentity::current();
    let server = Arc::new(SlowFs::new(config, owner));
    let requests = RequestTracker::new();
    let fs = SlowFuse::new(Arc::clone(&server), Arc::clone(&requests))
        .map_err(|e| MountError::Mount(io::Error::other(e.to_string())))?;

    let mount_options = build_mount_options(options);

    let mut handle = MountHandle {
        session: None,
        mountpoint: target.to_path_buf(),
        state: MountState::Unmounted,
        server,
        requests,
    };

    let session = spawn_mount_with_timeout(fs, target, &mount_options, options.mount_timeout)?;
    handle.session = Some(session);
    handle.transition(MountState::Mounted)?;

    // On failure the handle's Drop tears the half-made mount down
    wait_for_mount(target, options)?;

    info!(mountpoint = %target.display(), "FUSE mount successful");
    Ok(handle)
}

/// Handle to a mounted server.
///
/// Call [`unmount`](Self::unmount) then [`join`](Self::join) for an orderly
/// shutdown. Dropping a handle that was not joined unmounts on a best-effort
/// basis.
pub struct MountHandle {
    session: Option<BackgroundSession>,
    mountpoint: PathBuf,
    state: MountState,
    server: Arc<SlowFs>,
    requests: Arc<RequestTracker>,
}

impl fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountHandle")
            .field("mountpoint", &self.mountpoint)
            .field("state", &self.state)
            .field("in_flight", &self.requests.in_flight())
            .finish_non_exhaustive()
    }
}

impl MountHandle {
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn state(&self) -> MountState {
        self.state
    }

    /// The server behind this mount.
    pub fn server(&self) -> &Arc<SlowFs> {
        &self.server
    }

    pub fn requests(&self) -> &Arc<RequestTracker> {
        &self.requests
    }

    pub fn snapshot(&self) -> RequestStatsSnapshot {
        self.requests.snapshot()
    }

    /// Interrupts every create that is currently pending.
    ///
    /// Each of them is answered with `EINTR`. Returns how many were pending.
    pub fn interrupt_in_flight(&self) -> usize {
        let pending = self.requests.interrupt_pending();
        debug!(pending, mountpoint = %self.mountpoint.display(), "Interrupted pending creates");
        pending
    }

    /// Asks the OS to detach the mount.
    ///
    /// On success the handle is `Draining`. On failure it stays `Mounted`.
    pub fn unmount(&mut self) -> Result<(), MountError> {
        self.check(MountState::Draining)?;
        info!(mountpoint = %self.mountpoint.display(), "Unmounting FUSE filesystem");
        detach(&self.mountpoint).map_err(MountError::Unmount)?;
        self.transition(MountState::Draining)
    }

    /// Waits for the session to exit and all pending requests to drain.
    ///
    /// Requires a prior successful [`unmount`](Self::unmount).
    pub fn join(&mut self) -> Result<(), MountError> {
        self.check(MountState::Unmounted)?;

        if let Some(session) = self.session.take() {
            let joiner = thread::Builder::new()
                .name("slowfs-join".to_string())
                .spawn(move || session.join())
                .map_err(|e| MountError::Join(format!("Failed to spawn join thread: {e}")))?;
            joiner
                .join()
                .map_err(|_| MountError::Join("FUSE session thread panicked".to_string()))?;
        }

        self.requests.wait_drained(None);
        self.transition(MountState::Unmounted)?;

        let stats = self.requests.snapshot();
        info!(
            mountpoint = %self.mountpoint.display(),
            completed = stats.completed,
            interrupted = stats.interrupted,
            "FUSE unmount successful"
        );
        Ok(())
    }

    fn check(&self, to: MountState) -> Result<(), MountError> {
        if self.state.can_transition_to(to) {
            Ok(())
        } else {
            Err(MountError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    fn transition(&mut self, to: MountState) -> Result<(), MountError> {
        self.check(to)?;
        debug!(from = %self.state, to = %to, "Mount state transition");
        self.state = to;
        Ok(())
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        debug!("Unmounting FUSE filesystem at {}", self.mountpoint.display());
        self.requests.cancel_all();

        // Spawn thread for potentially blocking join() so we can timeout
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            session.join();
            let _ = tx.send(());
        });

        match rx.recv_timeout(JOIN_TIMEOUT) {
            Ok(()) => {
                debug!("Graceful unmount completed for {}", self.mountpoint.display());
            }
            Err(_) => {
                warn!(
                    "session.join() timed out after {:?} for {}, forcing unmount",
                    JOIN_TIMEOUT,
                    self.mountpoint.display()
                );
                force_unmount(&self.mountpoint);
            }
        }
        self.state = MountState::Unmounted;
    }
}

/// Options passed to the kernel for every slowfs mount.
fn build_mount_options(options: &MountOptions) -> Vec<MountOption> {
    let mount_options = vec![
        MountOption::FSName(options.fs_name.clone()),
        MountOption::Subtype("slowfs".to_string()),
        MountOption::AutoUnmount,
    ];

    #[cfg(target_os = "macos")]
    let mount_options = {
        let mut mount_options = mount_options;
        mount_options.push(MountOption::CUSTOM(format!("volname={}", options.fs_name)));
        mount_options
    };

    mount_options
}

/// Mounts with `spawn_mount2` on a helper thread, so a mount syscall that
/// blocks (e.g. on a stale mount) cannot hang the caller.
fn spawn_mount_with_timeout(
    fs: SlowFuse,
    mountpoint: &Path,
    options: &[MountOption],
    timeout: Duration,
) -> Result<BackgroundSession, MountError> {
    let mountpoint = mountpoint.to_path_buf();
    let options: Vec<MountOption> = options.to_vec();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let result = fuser::spawn_mount2(fs, &mountpoint, &options);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(session)) => Ok(session),
        Ok(Err(e)) => Err(MountError::Mount(e)),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(MountError::Mount(io::Error::new(
            io::ErrorKind::TimedOut,
            "Mount operation timed out - the mountpoint may be on a stale FUSE mount",
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(MountError::Mount(io::Error::other(
            "Mount thread terminated unexpectedly",
        ))),
    }
}

/// Polls until the mount point's device id differs from its parent's.
fn wait_for_mount(mount_point: &Path, options: &MountOptions) -> Result<(), MountError> {
    use std::os::unix::fs::MetadataExt;

    let deadline = Instant::now() + options.mount_timeout;
    let parent = mount_point.parent().unwrap_or(Path::new("/"));

    while Instant::now() < deadline {
        if let (Ok(path_meta), Ok(parent_meta)) = (
            metadata_with_timeout(mount_point, STAT_TIMEOUT),
            metadata_with_timeout(parent, STAT_TIMEOUT),
        )
            && path_meta.dev() != parent_meta.dev()
        {
            debug!(
                "FUSE mount confirmed active at {} (dev {} != parent dev {})",
                mount_point.display(),
                path_meta.dev(),
                parent_meta.dev()
            );
            return Ok(());
        }
        thread::sleep(options.poll_interval);
    }

    Err(MountError::Mount(io::Error::new(
        io::ErrorKind::TimedOut,
        format!(
            "FUSE mount did not become ready within {:?}",
            options.mount_timeout
        ),
    )))
}

/// Stats `path` on a helper thread, giving up after `timeout`.
///
/// A stat on a wedged FUSE mount never returns. The helper thread leaks in
/// that case.
fn metadata_with_timeout(path: &Path, timeout: Duration) -> io::Result<std::fs::Metadata> {
    let path = path.to_path_buf();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let _ = tx.send(std::fs::metadata(&path));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "stat timed out - the path may be on a stale mount",
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(io::Error::other("stat thread terminated unexpectedly"))
        }
    }
}

/// Detaches the mount with the platform's unmount tool.
fn detach(mountpoint: &Path) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    let tools: &[(&str, &[&str])] = &[("fusermount3", &["-u"]), ("fusermount", &["-u"])];
    #[cfg(not(target_os = "linux"))]
    let tools: &[(&str, &[&str])] = &[("umount", &[])];

    let mut last_error = None;
    for (tool, args) in tools {
        match Command::new(tool).args(*args).arg(mountpoint).output() {
            Ok(output) if output.status.success() => {
                debug!(tool, mountpoint = %mountpoint.display(), "Detached mount");
                return Ok(());
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                last_error = Some(io::Error::other(format!(
                    "{tool} exited with {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }
            Err(e) => {
                debug!(tool, error = %e, "Unmount tool unavailable");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::other("No unmount tool available")))
}

/// Forces the mount off when a graceful join is stuck.
fn force_unmount(mountpoint: &Path) {
    #[cfg(target_os = "macos")]
    {
        let result = Command::new("diskutil")
            .args(["unmount", "force"])
            .arg(mountpoint)
            .output();

        if matches!(result, Ok(ref output) if output.status.success()) {
            debug!("Force unmount via diskutil succeeded");
            return;
        }
        debug!("diskutil unmount failed, trying umount");

        let _ = Command::new("umount").arg("-f").arg(mountpoint).output();
    }

    #[cfg(target_os = "linux")]
    {
        // Lazy unmount
        let _ = Command::new("fusermount").args(["-uz"]).arg(mountpoint).output();
    }
}
