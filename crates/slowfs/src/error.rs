//! Error types and their mapping to POSIX error codes.

use crate::inode::InodeId;
use crate::lifecycle::MountState;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by filesystem operations.
#[derive(Debug, Error)]
pub enum SlowFsError {
    /// The namespace is always empty, so every lookup ends here.
    #[error("No entry named {name:?} under inode {parent}")]
    NotFound { parent: InodeId, name: OsString },

    /// The request was cancelled while it was still pending.
    #[error("Request interrupted before completion")]
    Interrupted,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SlowFsError {
    /// Converts this error to a libc error code for FUSE.
    pub fn to_errno(&self) -> i32 {
        match self {
            SlowFsError::NotFound { .. } => libc::ENOENT,
            SlowFsError::Interrupted => libc::EINTR,
            SlowFsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Result type for filesystem operations.
pub type SlowFsResult<T> = Result<T, SlowFsError>;

/// Errors from the mount lifecycle.
#[derive(Debug, Error)]
pub enum MountError {
    /// The mount point is missing or not a directory.
    #[error("Mount point is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Registering the filesystem with the kernel failed.
    #[error("Mount failed: {0}")]
    Mount(#[source] io::Error),

    /// Detaching the filesystem failed.
    #[error("Unmount failed: {0}")]
    Unmount(#[source] io::Error),

    /// Waiting for the session to finish failed.
    #[error("Join failed: {0}")]
    Join(String),

    /// The requested lifecycle step is not valid in the current state.
    #[error("Invalid mount state transition: {from} -> {to}")]
    InvalidTransition { from: MountState, to: MountState },
}
