//! FUSE filesystem that delays file creation.
//!
//! slowfs mounts an always-empty directory whose only interesting operation
//! is `create`: every create is held for a configurable delay before it is
//! answered. That keeps the calling thread inside `open(2)` long enough for a
//! signal to land mid-syscall, which reproduces `EINTR` handling bugs in
//! clients and language runtimes.
//!
//! # Features
//!
//! - Empty namespace: every lookup fails with `ENOENT`
//! - Synthesized attributes: root is a `0777` directory, everything else a `0666` file
//! - Delayed creates answered off the session thread, so many can overlap
//! - Per-request cancellation, surfaced to the kernel as `EINTR`
//! - Explicit mount lifecycle (`Mounted -> Draining -> Unmounted`)
//!
//! # Usage
//!
//! ```ignore
//! use slowfs::{mount, ServerConfig};
//! use std::time::Duration;
//!
//! let mut handle = mount("/mnt/slow", ServerConfig::with_delay(Duration::from_secs(1)))?;
//! // ... run clients against /mnt/slow ...
//! handle.unmount()?;
//! handle.join()?;
//! ```

pub mod attr;
pub mod config;
pub mod error;
pub mod exit_code;
pub mod filesystem;
pub mod identity;
pub mod inode;
pub mod lifecycle;
pub mod logging;
pub mod requests;
pub mod server;

pub use attr::{InodeAttributes, InodeKind};
pub use config::{MountOptions, ServerConfig};
pub use error::{MountError, SlowFsError, SlowFsResult};
pub use filesystem::SlowFuse;
pub use identity::ProcessIdentity;
pub use inode::{InodeAllocator, InodeId, ROOT_INODE};
pub use lifecycle::{mount, mount_with_options, MountHandle, MountState};
pub use requests::{InFlightRequest, RequestOutcome, RequestStatsSnapshot, RequestTracker};
pub use server::{ChildInodeEntry, FsStats, SlowFs};
