//! Process identity reported as the owner of every inode.

use nix::unistd::{getgid, getuid};

/// User and group of the serving process.
///
/// Resolved once when the filesystem is mounted and cached for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl ProcessIdentity {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// The real uid/gid of the current process.
    pub fn current() -> Self {
        Self {
            uid: getuid().as_raw(),
            gid: getgid().as_raw(),
        }
    }
}
