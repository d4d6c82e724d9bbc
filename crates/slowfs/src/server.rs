//! The filesystem server proper.
//!
//! [`SlowFs`] answers the four operations needed to reproduce the create/signal
//! race and nothing else:
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | `stat_fs` | Always succeeds with an all-zero record |
//! | `look_up_inode` | Always `NotFound`, the namespace is empty |
//! | `get_inode_attributes` | Directory for the root, file for anything else |
//! | `create_file` | Sleeps for the configured delay, then allocates an inode |
//!
//! The server is independent of FUSE. The [`SlowFuse`](crate::SlowFuse)
//! adapter maps kernel callbacks onto it, and tests drive it directly.

use crate::attr::InodeAttributes;
use crate::config::ServerConfig;
use crate::error::{SlowFsError, SlowFsResult};
use crate::identity::ProcessIdentity;
use crate::inode::{InodeAllocator, InodeId};
use std::ffi::OsStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Filesystem statistics returned by [`SlowFs::stat_fs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsStats {
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub block_size: u32,
    pub name_max: u32,
    pub fragment_size: u32,
}

/// A newly created child and its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildInodeEntry {
    pub child: InodeId,
    pub attributes: InodeAttributes,
}

/// Stateful handler for the minimal operation set.
#[derive(Debug)]
pub struct SlowFs {
    config: ServerConfig,
    owner: ProcessIdentity,
    inodes: Arc<InodeAllocator>,
}

impl SlowFs {
    /// Creates a server with a fresh allocator.
    pub fn new(config: ServerConfig, owner: ProcessIdentity) -> Self {
        Self::with_allocator(config, owner, Arc::new(InodeAllocator::new()))
    }

    /// Creates a server that issues inodes from an existing allocator.
    pub fn with_allocator(
        config: ServerConfig,
        owner: ProcessIdentity,
        inodes: Arc<InodeAllocator>,
    ) -> Self {
        debug!(
            uid = owner.uid,
            gid = owner.gid,
            create_delay = ?config.create_delay,
            "SlowFs created"
        );
        Self {
            config,
            owner,
            inodes,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn owner(&self) -> ProcessIdentity {
        self.owner
    }

    /// The allocator shared by this server.
    pub fn allocator(&self) -> &Arc<InodeAllocator> {
        &self.inodes
    }

    pub fn stat_fs(&self) -> FsStats {
        FsStats::default()
    }

    /// Resolves `name` under `parent`. Never succeeds.
    pub fn look_up_inode(&self, parent: InodeId, name: &OsStr) -> SlowFsResult<ChildInodeEntry> {
        trace!(parent = %parent, name = ?name, "look_up_inode");
        Err(SlowFsError::NotFound {
            parent,
            name: name.to_os_string(),
        })
    }

    pub fn get_inode_attributes(&self, id: InodeId) -> InodeAttributes {
        InodeAttributes::for_inode(id, self.owner)
    }

    /// Creates a file after holding the request for the configured delay.
    ///
    /// `parent` and `name` are only logged. The inode is allocated after the
    /// delay, so a request cancelled during the delay consumes no identifier
    /// and returns [`SlowFsError::Interrupted`].
    pub async fn create_file(
        &self,
        parent: InodeId,
        name: &OsStr,
        cancel: &CancellationToken,
    ) -> SlowFsResult<ChildInodeEntry> {
        trace!(parent = %parent, name = ?name, delay = ?self.config.create_delay, "create_file");

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(parent = %parent, name = ?name, "create_file interrupted during delay");
                return Err(SlowFsError::Interrupted);
            }
            () = tokio::time::sleep(self.config.create_delay) => {}
        }

        let child = self.inodes.allocate();
        trace!(parent = %parent, name = ?name, inode = %child, "create_file allocated");

        Ok(ChildInodeEntry {
            child,
            attributes: InodeAttributes::regular_file(self.owner),
        })
    }
}
