//! In-flight request tracking for delayed operations.
//!
//! Every delayed request is registered with a [`RequestTracker`] for as long
//! as it is pending. Registration hands the request a cancellation token,
//! which is how an interruption reaches the request. Teardown uses the
//! tracker to wait until all pending requests have drained.
//!
//! Tokens form a small tree: shutdown token, then the current generation,
//! then one token per request. [`RequestTracker::interrupt_pending`] cancels
//! the current generation and starts a new one, so requests registered
//! afterwards are unaffected. [`RequestTracker::cancel_all`] cancels the
//! shutdown token, which reaches every pending and future request.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Counters for tracked requests (for observability).
#[derive(Debug, Default)]
pub struct RequestStats {
    pub started: AtomicU64,
    pub completed: AtomicU64,
    pub interrupted: AtomicU64,
}

/// Point-in-time copy of [`RequestStats`] plus the in-flight count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStatsSnapshot {
    pub started: u64,
    pub completed: u64,
    pub interrupted: u64,
    pub in_flight: usize,
}

/// How a tracked request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed,
    Interrupted,
}

/// Registry of pending requests with drain support.
#[derive(Debug)]
pub struct RequestTracker {
    in_flight: Mutex<usize>,
    drained: Condvar,
    shutdown: CancellationToken,
    generation: Mutex<CancellationToken>,
    stats: RequestStats,
}

impl RequestTracker {
    pub fn new() -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let generation = Mutex::new(shutdown.child_token());
        Arc::new(Self {
            in_flight: Mutex::new(0),
            drained: Condvar::new(),
            shutdown,
            generation,
            stats: RequestStats::default(),
        })
    }

    /// Registers a new pending request.
    ///
    /// After [`cancel_all`](Self::cancel_all) the returned request is born
    /// cancelled.
    pub fn begin(self: &Arc<Self>) -> InFlightRequest {
        // Lock order: generation, then in_flight
        let generation = self.generation.lock();
        let token = generation.child_token();
        *self.in_flight.lock() += 1;
        drop(generation);

        self.stats.started.fetch_add(1, Ordering::Relaxed);
        InFlightRequest {
            tracker: Arc::clone(self),
            token,
            outcome: None,
        }
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Interrupts the requests pending right now.
    ///
    /// Returns how many requests were pending.
    pub fn interrupt_pending(&self) -> usize {
        let (pending, previous) = {
            let mut generation = self.generation.lock();
            let pending = self.in_flight();
            let previous = std::mem::replace(&mut *generation, self.shutdown.child_token());
            (pending, previous)
        };
        previous.cancel();
        pending
    }

    /// Cancels every pending and future request.
    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Blocks until no request is pending.
    ///
    /// Returns `true` once drained, `false` if `timeout` expired first.
    /// `None` waits indefinitely.
    pub fn wait_drained(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.in_flight.lock();
        while *guard > 0 {
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut guard, deadline).timed_out() {
                        return *guard == 0;
                    }
                }
                None => self.drained.wait(&mut guard),
            }
        }
        true
    }

    pub fn snapshot(&self) -> RequestStatsSnapshot {
        RequestStatsSnapshot {
            started: self.stats.started.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            interrupted: self.stats.interrupted.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }

    fn release(&self, outcome: RequestOutcome) {
        match outcome {
            RequestOutcome::Completed => self.stats.completed.fetch_add(1, Ordering::Relaxed),
            RequestOutcome::Interrupted => self.stats.interrupted.fetch_add(1, Ordering::Relaxed),
        };

        let mut guard = self.in_flight.lock();
        *guard -= 1;
        if *guard == 0 {
            self.drained.notify_all();
        }
    }
}

/// A pending request. Dropping it deregisters the request.
///
/// A request dropped without [`finish`](Self::finish) (for example because
/// its task was aborted) is counted as interrupted.
#[derive(Debug)]
pub struct InFlightRequest {
    tracker: Arc<RequestTracker>,
    token: CancellationToken,
    outcome: Option<RequestOutcome>,
}

impl InFlightRequest {
    /// Token that fires when this request is interrupted.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Interrupts this request only.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Records the outcome and deregisters the request.
    pub fn finish(mut self, outcome: RequestOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        self.tracker
            .release(self.outcome.unwrap_or(RequestOutcome::Interrupted));
    }
}
