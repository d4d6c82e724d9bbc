//! Configuration for the filesystem server and its mount.
//!
//! The server recognizes exactly one knob, the create delay. Mount options
//! only affect how the session is registered with the kernel.

use std::time::Duration;

/// Default create delay (1 second).
pub const DEFAULT_CREATE_DELAY: Duration = Duration::from_secs(1);

/// Default time to wait for a mount to become visible.
pub const DEFAULT_MOUNT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default polling interval while waiting for a mount.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for [`SlowFs`](crate::SlowFs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// How long every create request is held before it is answered.
    ///
    /// Default: 1 second.
    pub create_delay: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            create_delay: DEFAULT_CREATE_DELAY,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration with the given create delay.
    pub fn with_delay(create_delay: Duration) -> Self {
        Self { create_delay }
    }

    /// Sets the create delay.
    #[must_use]
    pub fn create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }
}

/// Options for registering the filesystem with the kernel.
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// Filesystem name shown in the mount table.
    pub fs_name: String,
    /// Maximum time to wait for the mount syscall and for the mount to become visible.
    pub mount_timeout: Duration,
    /// Polling interval while waiting for the mount to become visible.
    pub poll_interval: Duration,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            fs_name: "slowfs".to_string(),
            mount_timeout: DEFAULT_MOUNT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl MountOptions {
    /// Sets the filesystem name.
    #[must_use]
    pub fn fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }

    /// Sets the mount timeout.
    #[must_use]
    pub fn mount_timeout(mut self, timeout: Duration) -> Self {
        self.mount_timeout = timeout;
        self
    }

    /// Sets the readiness polling interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
