//! Test mount harness for FUSE integration tests.
//!
//! Provides `TestMount`, which mounts a fresh slowfs instance on a temporary
//! directory and tears it down in order (unmount, then join) on drop.

// Not all tests use all TestMount methods
#![allow(dead_code)]

use slowfs::{MountHandle, MountOptions, ServerConfig};
use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// How long to wait for mount to become ready.
const MOUNT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait between mount readiness checks.
const MOUNT_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// A mounted slowfs instance for testing.
///
/// # Example
///
/// ```ignore
/// use common::TestMount;
///
/// #[test]
/// fn test_create_is_slow() {
///     let mount = require_mount!(TestMount::with_delay(Duration::from_millis(300)));
///     let start = Instant::now();
///     mount.create("foo").unwrap();
///     assert!(start.elapsed() >= Duration::from_millis(300));
/// }
/// ```
pub struct TestMount {
    /// The mount (unmounted and joined on drop).
    handle: Option<MountHandle>,
    /// Path where slowfs is mounted.
    pub mount_path: PathBuf,
    /// Temporary mount point directory.
    _temp_mount: TempDir,
}

impl TestMount {
    /// Mount with the given create delay.
    pub fn with_delay(delay: Duration) -> Result<Self, String> {
        let temp_mount = TempDir::new().map_err(|e| format!("Failed to create temp dir: {e}"))?;
        let mount_path = temp_mount.path().join("mnt");
        fs::create_dir(&mount_path).map_err(|e| format!("Failed to create mount point: {e}"))?;

        let options = MountOptions::default()
            .fs_name("slowfs-test")
            .mount_timeout(MOUNT_READY_TIMEOUT)
            .poll_interval(MOUNT_CHECK_INTERVAL);

        let config = ServerConfig::with_delay(delay);
        let handle = slowfs::mount_with_options(&mount_path, config, &options)
            .map_err(|e| format!("Failed to mount: {e}"))?;

        // macFUSE can report the mount as ready before create() works
        thread::sleep(Duration::from_millis(100));

        Ok(Self {
            handle: Some(handle),
            mount_path,
            _temp_mount: temp_mount,
        })
    }

    /// Mount with no create delay.
    pub fn instant() -> Result<Self, String> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn handle(&self) -> &MountHandle {
        self.handle.as_ref().expect("mount already shut down")
    }

    pub fn handle_mut(&mut self) -> &mut MountHandle {
        self.handle.as_mut().expect("mount already shut down")
    }

    /// Get the full path for a relative path within the mount.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.mount_path.join(relative)
    }

    /// Create a file (`O_CREAT|O_WRONLY|O_TRUNC`, mode 0644).
    pub fn create(&self, path: &str) -> io::Result<File> {
        File::create(self.path(path))
    }

    /// Open the way the stress workload does
    /// (`O_CREAT|O_WRONLY|O_APPEND|O_TRUNC`, mode 0600).
    pub fn open_append_truncate(&self, path: &str) -> io::Result<File> {
        // std rejects append together with truncate, so O_TRUNC goes in raw
        OpenOptions::new()
            .append(true)
            .create(true)
            .custom_flags(libc::O_TRUNC)
            .mode(0o600)
            .open(self.path(path))
    }

    /// Open an existing file (no `O_CREAT`).
    pub fn open_existing(&self, path: &str) -> io::Result<File> {
        File::open(self.path(path))
    }

    pub fn metadata(&self, path: &str) -> io::Result<Metadata> {
        fs::metadata(self.path(path))
    }

    pub fn root_metadata(&self) -> io::Result<Metadata> {
        fs::metadata(&self.mount_path)
    }

    /// Unmount and join, returning any teardown error.
    pub fn shutdown(mut self) -> Result<(), slowfs::MountError> {
        let mut handle = self.handle.take().expect("mount already shut down");
        handle.unmount()?;
        handle.join()
    }
}

impl Drop for TestMount {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            match handle.unmount() {
                Ok(()) => {
                    if let Err(e) = handle.join() {
                        eprintln!("[test-harness] Warning: join failed: {e}");
                    }
                }
                Err(e) => eprintln!("[test-harness] Warning: unmount failed: {e}"),
            }
        }
    }
}

/// Check if FUSE is available on this system.
pub fn fuse_available() -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new("/dev/fuse").exists()
    }
    #[cfg(target_os = "macos")]
    {
        Path::new("/Library/Filesystems/macfuse.fs").exists()
            || Path::new("/Library/Filesystems/osxfuse.fs").exists()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        false
    }
}

/// Skip test if FUSE is not available.
#[macro_export]
macro_rules! skip_if_no_fuse {
    () => {
        if !$crate::common::harness::fuse_available() {
            eprintln!("Skipping test: FUSE not available on this system");
            return;
        }
    };
}

/// Skip test if mounting fails (common in CI environments).
#[macro_export]
macro_rules! require_mount {
    ($mount_result:expr) => {
        match $mount_result {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Skipping test: {}", e);
                return;
            }
        }
    };
}
