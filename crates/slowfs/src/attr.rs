//! Synthesized inode attributes.
//!
//! Nothing about an inode is stored. Attributes are a pure function of
//! whether the inode is the root and of the process identity; the root looks
//! like a directory and everything else looks like an empty regular file.

use crate::identity::ProcessIdentity;
use crate::inode::InodeId;
use fuser::{FileAttr, FileType};
use std::time::{SystemTime, UNIX_EPOCH};

/// Block size reported to the kernel.
pub const BLOCK_SIZE: u32 = 4096;

/// Root directory permissions (rwxrwxrwx).
pub const ROOT_DIR_PERM: u16 = 0o777;

/// Permissions of every non-root inode (rw-rw-rw-).
pub const FILE_PERM: u16 = 0o666;

/// The type half of an inode's mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Directory,
    RegularFile,
}

impl From<InodeKind> for FileType {
    fn from(kind: InodeKind) -> Self {
        match kind {
            InodeKind::Directory => FileType::Directory,
            InodeKind::RegularFile => FileType::RegularFile,
        }
    }
}

/// Mode and ownership of an inode. Size, timestamps and link count are not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeAttributes {
    pub kind: InodeKind,
    pub perm: u16,
    pub uid: u32,
    pub gid: u32,
}

impl InodeAttributes {
    /// Attributes of the root directory.
    pub fn directory(owner: ProcessIdentity) -> Self {
        Self {
            kind: InodeKind::Directory,
            perm: ROOT_DIR_PERM,
            uid: owner.uid,
            gid: owner.gid,
        }
    }

    /// Attributes of any non-root inode.
    pub fn regular_file(owner: ProcessIdentity) -> Self {
        Self {
            kind: InodeKind::RegularFile,
            perm: FILE_PERM,
            uid: owner.uid,
            gid: owner.gid,
        }
    }

    /// Directory attributes for the root, file attributes for anything else.
    ///
    /// `id` is not checked against the allocator; never-allocated inodes
    /// still come back as files.
    pub fn for_inode(id: InodeId, owner: ProcessIdentity) -> Self {
        if id.is_root() {
            Self::directory(owner)
        } else {
            Self::regular_file(owner)
        }
    }

    /// Full `st_mode` value (type bits | permission bits).
    pub fn mode(&self) -> u32 {
        let type_bits = match self.kind {
            InodeKind::Directory => libc::S_IFDIR,
            InodeKind::RegularFile => libc::S_IFREG,
        };
        u32::from(type_bits) | u32::from(self.perm)
    }

    /// Builds the kernel attribute record for `id`.
    ///
    /// Untracked fields get fixed values: zero size, epoch timestamps.
    pub fn to_file_attr(&self, id: InodeId) -> FileAttr {
        let epoch: SystemTime = UNIX_EPOCH;
        FileAttr {
            ino: id.raw(),
            size: 0,
            blocks: 0,
            atime: epoch,
            mtime: epoch,
            ctime: epoch,
            crtime: epoch,
            kind: self.kind.into(),
            perm: self.perm,
            nlink: match self.kind {
                InodeKind::Directory => 2,
                InodeKind::RegularFile => 1,
            },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }
}
