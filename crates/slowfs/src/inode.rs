//! Inode identifiers and their allocator.
//!
//! The namespace is flat and never remembered, so the only inode state the
//! filesystem keeps is a single counter. [`InodeAllocator`] owns that counter
//! behind a mutex and is shared via `Arc`, which lets several independent
//! filesystem instances live side by side in one process.

use parking_lot::Mutex;
use std::fmt;

/// The root inode number (FUSE convention).
pub const ROOT_INODE: InodeId = InodeId(1);

/// Opaque inode identifier.
///
/// Identifiers handed out by one [`InodeAllocator`] are unique and strictly
/// increasing; they are never reused for the lifetime of the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InodeId(pub u64);

impl InodeId {
    /// Get the raw inode number.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is the root inode.
    #[inline]
    pub fn is_root(self) -> bool {
        self == ROOT_INODE
    }
}

impl From<u64> for InodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic inode number issuance under mutual exclusion.
///
/// The lock only covers the increment-and-read, so callers contend for a
/// handful of instructions at most.
#[derive(Debug)]
pub struct InodeAllocator {
    next: Mutex<u64>,
}

impl InodeAllocator {
    /// Creates an allocator whose first identifier is `ROOT_INODE + 1`.
    pub fn new() -> Self {
        Self {
            next: Mutex::new(ROOT_INODE.raw() + 1),
        }
    }

    /// Allocates the next identifier.
    pub fn allocate(&self) -> InodeId {
        let mut next = self.next.lock();
        let id = InodeId(*next);
        *next += 1;
        id
    }

    /// Returns the identifier the next [`allocate`](Self::allocate) call would return.
    pub fn peek_next(&self) -> InodeId {
        InodeId(*self.next.lock())
    }

    /// Number of identifiers handed out so far.
    pub fn allocated(&self) -> u64 {
        *self.next.lock() - (ROOT_INODE.raw() + 1)
    }
}

impl Default for InodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}
