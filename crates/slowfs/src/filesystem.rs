//! FUSE adapter for [`SlowFs`].
//!
//! This module implements the fuser `Filesystem` trait on top of the
//! transport-independent server in [`crate::server`].
//!
//! | Operation | Reply |
//! |-----------|-------|
//! | init/destroy | OK; destroy waits briefly for pending creates |
//! | statfs | All-zero statistics |
//! | lookup | Always `ENOENT` |
//! | getattr | Directory for root, regular file otherwise |
//! | create | Delayed, answered from the runtime; `EINTR` if interrupted |
//! | everything else | fuser default (`ENOSYS`) |
//!
//! fuser dispatches callbacks from a single session thread. `create` must
//! therefore not sleep on that thread: it registers the request, spawns the
//! delayed work on a tokio runtime and returns. The reply is sent from the
//! spawned task, so many creates can be pending at once.

use crate::error::SlowFsError;
use crate::inode::InodeId;
use crate::requests::{RequestOutcome, RequestTracker};
use crate::server::SlowFs;
use fuser::{Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyEntry, ReplyStatfs, Request};
use libc::c_int;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, trace, warn};

/// Cache TTL for entries and attributes.
///
/// Zero, so the kernel asks again on every open and each open reaches `create`.
const ATTR_TTL: Duration = Duration::ZERO;

/// How long `destroy` waits for pending creates before the runtime is dropped.
const DESTROY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// FUSE filesystem that delays file creation.
pub struct SlowFuse {
    /// Handle to the runtime that runs delayed creates.
    handle: Handle,
    /// Owned tokio runtime.
    /// IMPORTANT: Declared after handle so it drops last.
    _runtime: Runtime,
    server: Arc<SlowFs>,
    requests: Arc<RequestTracker>,
}

impl SlowFuse {
    /// Creates the adapter with its own multi-threaded runtime.
    pub fn new(server: Arc<SlowFs>, requests: Arc<RequestTracker>) -> Result<Self, SlowFsError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("slowfs-worker")
            .build()
            .map_err(|e| {
                SlowFsError::Io(std::io::Error::other(format!(
                    "Failed to create tokio runtime: {e}"
                )))
            })?;
        let handle = runtime.handle().clone();
        Ok(Self {
            handle,
            _runtime: runtime,
            server,
            requests,
        })
    }

    pub fn server(&self) -> &Arc<SlowFs> {
        &self.server
    }

    pub fn requests(&self) -> &Arc<RequestTracker> {
        &self.requests
    }
}

impl Filesystem for SlowFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(
            create_delay = ?self.server.config().create_delay,
            uid = self.server.owner().uid,
            gid = self.server.owner().gid,
            "FUSE filesystem initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        let pending = self.requests.in_flight();
        if pending > 0 {
            debug!(pending, "destroy: waiting for pending creates");
            if !self.requests.wait_drained(Some(DESTROY_DRAIN_TIMEOUT)) {
                warn!(
                    pending = self.requests.in_flight(),
                    "destroy: creates still pending, they will be dropped with the runtime"
                );
            }
        }
        info!(
            allocated = self.server.allocator().allocated(),
            "FUSE filesystem destroyed"
        );
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.server.look_up_inode(InodeId(parent), name) {
            Ok(entry) => {
                let attr = entry.attributes.to_file_attr(entry.child);
                reply.entry(&ATTR_TTL, &attr, 0);
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, "getattr");
        let id = InodeId(ino);
        let attr = self.server.get_inode_attributes(id).to_file_attr(id);
        reply.attr(&ATTR_TTL, &attr);
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stats = self.server.stat_fs();
        reply.statfs(
            stats.blocks,
            stats.blocks_free,
            stats.blocks_available,
            stats.files,
            stats.files_free,
            stats.block_size,
            stats.name_max,
            stats.fragment_size,
        );
    }

    /// Create and open a file.
    ///
    /// Answered asynchronously once the configured delay has passed. If the
    /// request is interrupted first, the kernel gets `EINTR` and no inode is
    /// allocated.
    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let unique = req.unique();
        let pid = req.pid();
        trace!(unique, pid, parent, name = ?name, "create");

        let request = self.requests.begin();
        let server = Arc::clone(&self.server);
        let name = name.to_os_string();

        self.handle.spawn(async move {
            let result = server
                .create_file(InodeId(parent), &name, request.token())
                .await;
            match result {
                Ok(entry) => {
                    let attr = entry.attributes.to_file_attr(entry.child);
                    reply.created(&ATTR_TTL, &attr, 0, 0, 0);
                    request.finish(RequestOutcome::Completed);
                }
                Err(e) => {
                    debug!(unique, pid, error = %e, "create failed");
                    reply.error(e.to_errno());
                    request.finish(RequestOutcome::Interrupted);
                }
            }
        });
    }
}

impl Drop for SlowFuse {
    fn drop(&mut self) {
        // Anything still pending is aborted when the owned runtime drops
        self.requests.cancel_all();
        debug!("SlowFuse dropped");
    }
}
