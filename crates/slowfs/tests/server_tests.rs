//! Behavioral tests for the server core, driven without a kernel mount.
//!
//! Cancellation tokens stand in for signals here, so the create/interrupt
//! race is reproduced deterministically.

use slowfs::{
    InodeId, InodeKind, ProcessIdentity, RequestOutcome, RequestTracker, ServerConfig, SlowFs,
    SlowFsError, ROOT_INODE,
};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn server(delay: Duration) -> Arc<SlowFs> {
    Arc::new(SlowFs::new(ServerConfig::with_delay(delay), ProcessIdentity::current()))
}

// =============================================================================
// Allocation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_distinct_inodes() {
    let fs = server(Duration::from_millis(20));
    let mut tasks = Vec::new();
    for i in 0..64 {
        let fs = Arc::clone(&fs);
        tasks.push(tokio::spawn(async move {
            let name = format!("file-{i}");
            fs.create_file(ROOT_INODE, OsStr::new(&name), &CancellationToken::new())
                .await
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        let entry = task.await.unwrap().unwrap();
        assert_eq!(entry.attributes.kind, InodeKind::RegularFile);
        ids.push(entry.child.raw());
    }

    ids.sort_unstable();
    let expected: Vec<u64> = (2..66).collect();
    assert_eq!(ids, expected, "identifiers must be unique and contiguous after root");
    assert_eq!(fs.allocator().allocated(), 64);
}

#[tokio::test]
async fn test_same_name_twice_gets_two_inodes() {
    let fs = server(Duration::ZERO);
    let token = CancellationToken::new();
    let a = fs.create_file(ROOT_INODE, OsStr::new("foo"), &token).await.unwrap();
    let b = fs.create_file(ROOT_INODE, OsStr::new("foo"), &token).await.unwrap();
    assert!(b.child > a.child);
}

#[tokio::test]
async fn test_parent_is_not_validated() {
    let fs = server(Duration::ZERO);
    let entry = fs
        .create_file(InodeId(9999), OsStr::new("orphan"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(entry.child, InodeId(2));
}

// =============================================================================
// Delay
// =============================================================================

#[tokio::test]
async fn test_create_respects_delay() {
    let delay = Duration::from_millis(300);
    let fs = server(delay);

    let start = Instant::now();
    fs.create_file(ROOT_INODE, OsStr::new("slow"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(start.elapsed() >= delay, "returned after {:?}", start.elapsed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delays_overlap() {
    let delay = Duration::from_millis(400);
    let fs = server(delay);

    let start = Instant::now();
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let fs = Arc::clone(&fs);
        tasks.push(tokio::spawn(async move {
            fs.create_file(ROOT_INODE, OsStr::new("foo"), &CancellationToken::new())
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Eight serialized delays would take 3.2s
    assert!(start.elapsed() < delay * 4, "creates did not overlap: {:?}", start.elapsed());
}

// =============================================================================
// Interruption
// =============================================================================

#[tokio::test]
async fn test_interrupt_during_delay() {
    let fs = server(Duration::from_secs(1));
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        })
    };

    let start = Instant::now();
    let err = fs
        .create_file(ROOT_INODE, OsStr::new("some_file"), &token)
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, SlowFsError::Interrupted));
    assert_eq!(err.to_errno(), libc::EINTR);
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(1), "interrupt was not prompt: {elapsed:?}");
    assert_eq!(fs.allocator().allocated(), 0, "interrupted create must not allocate");
    canceller.await.unwrap();
}

#[tokio::test]
async fn test_interrupt_then_retry_succeeds() {
    let delay = Duration::from_millis(500);
    let fs = server(delay);
    let tracker = RequestTracker::new();

    // What a retrying caller sees: first attempt interrupted, second completes
    let first = tracker.begin();
    first.cancel();
    let err = fs
        .create_file(ROOT_INODE, OsStr::new("some_file"), first.token())
        .await
        .unwrap_err();
    assert!(matches!(err, SlowFsError::Interrupted));
    first.finish(RequestOutcome::Interrupted);

    let second = tracker.begin();
    let start = Instant::now();
    let entry = fs
        .create_file(ROOT_INODE, OsStr::new("some_file"), second.token())
        .await
        .unwrap();
    second.finish(RequestOutcome::Completed);

    assert!(start.elapsed() >= delay);
    assert_eq!(entry.child, InodeId(2));

    let stats = tracker.snapshot();
    assert_eq!(stats.interrupted, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interrupt_pending_spares_later_creates() {
    let fs = server(Duration::from_millis(300));
    let tracker = RequestTracker::new();

    let pending = tracker.begin();
    let interrupted = {
        let fs = Arc::clone(&fs);
        tokio::spawn(async move {
            let result = fs
                .create_file(ROOT_INODE, OsStr::new("a"), pending.token())
                .await;
            pending.finish(RequestOutcome::Interrupted);
            result
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tracker.interrupt_pending(), 1);
    assert!(matches!(interrupted.await.unwrap(), Err(SlowFsError::Interrupted)));

    let later = tracker.begin();
    let entry = fs
        .create_file(ROOT_INODE, OsStr::new("b"), later.token())
        .await
        .unwrap();
    later.finish(RequestOutcome::Completed);
    assert_eq!(entry.child, InodeId(2));
}

// =============================================================================
// Lookup and attributes
// =============================================================================

#[tokio::test]
async fn test_lookup_after_create_still_not_found() {
    let fs = server(Duration::ZERO);
    fs.create_file(ROOT_INODE, OsStr::new("foo"), &CancellationToken::new())
        .await
        .unwrap();

    let err = fs.look_up_inode(ROOT_INODE, OsStr::new("foo")).unwrap_err();
    assert!(matches!(err, SlowFsError::NotFound { .. }));
}

#[test]
fn test_attributes_for_unallocated_inode() {
    let fs = server(Duration::ZERO);
    assert_eq!(fs.get_inode_attributes(ROOT_INODE).kind, InodeKind::Directory);
    assert_eq!(fs.get_inode_attributes(InodeId(1 << 40)).kind, InodeKind::RegularFile);
    assert_eq!(fs.allocator().allocated(), 0);
}

#[test]
fn test_owner_is_current_process() {
    let fs = server(Duration::ZERO);
    let attrs = fs.get_inode_attributes(ROOT_INODE);
    let me = ProcessIdentity::current();
    assert_eq!((attrs.uid, attrs.gid), (me.uid, me.gid));
}
