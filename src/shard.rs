//! # Coalescing Shards
//!
//! A shard owns the registry of calls currently in flight for the keys routed
//! to it. The registry lock is only held for map inserts and removals; work
//! runs and waiters block with no shard lock held, so unrelated keys sharing a
//! shard never wait on each other.
//!
//! Completion ordering: the executor removes its entry from the registry
//! before publishing the result and waking waiters. A caller that arrives after
//! removal starts a fresh call instead of joining one that is being torn down.
//! Completion runs from a drop guard, so a panicking work closure (or a
//! panicking `Clone` of its result) still releases its waiters.
//!
//! A closed shard rejects new calls under the registry lock. Once
//! [`Shard::close`] returns, nothing can register, so an idle shard stays
//! idle.

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use crate::error::FlightError;

/// Map a fingerprint to a shard index in `[0, shard_count)`.
///
/// `shard_count` must be at least 1.
#[inline]
pub fn select_shard(fingerprint: u64, shard_count: usize) -> usize {
    debug_assert!(shard_count > 0, "shard count must be positive");
    (fingerprint % shard_count as u64) as usize
}

/// Result of one caller's pass through the coalescing protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<V, E> {
    pub result: Result<V, FlightError<E>>,
    /// `false` only for the caller whose invocation ran the work.
    pub shared: bool,
}

impl<V, E> Outcome<V, E> {
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    #[inline]
    pub fn into_result(self) -> Result<V, FlightError<E>> {
        self.result
    }
}

/// Completion state of an in-flight call. Once it leaves `Pending` it never
/// changes again.
enum Completion<V, E> {
    Pending,
    Done(Result<V, E>),
    Panicked,
}

impl<V: Clone, E: Clone> Completion<V, E> {
    fn resolved(&self) -> Option<Result<V, FlightError<E>>> {
        match self {
            Completion::Pending => None,
            Completion::Done(Ok(value)) => Some(Ok(value.clone())),
            Completion::Done(Err(err)) => Some(Err(FlightError::Work(err.clone()))),
            Completion::Panicked => Some(Err(FlightError::Panicked)),
        }
    }
}

/// Bookkeeping for one execution that has not completed yet.
struct InFlightCall<V, E> {
    state: Mutex<Completion<V, E>>,
    done: Condvar,
    /// Callers that joined this call; final once the call leaves the registry.
    waiters: AtomicUsize,
}

impl<V: Clone, E: Clone> InFlightCall<V, E> {
    fn new() -> Self {
        Self {
            state: Mutex::new(Completion::Pending),
            done: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }

    fn complete(&self, completion: Completion<V, E>) {
        *self.state.lock() = completion;
        self.done.notify_all();
    }

    /// Block until the call completes, or until `timeout` elapses. A timeout
    /// too large to express as a deadline waits forever.
    fn wait(&self, timeout: Option<Duration>) -> Result<V, FlightError<E>> {
        let deadline = timeout.and_then(|t| Some((t, Instant::now().checked_add(t)?)));
        let mut state = self.state.lock();
        loop {
            if let Some(result) = state.resolved() {
                return result;
            }
            match deadline {
                None => self.done.wait(&mut state),
                Some((timeout, deadline)) => {
                    if self.done.wait_until(&mut state, deadline).timed_out() {
                        return state
                            .resolved()
                            .unwrap_or(Err(FlightError::Timeout(timeout)));
                    }
                }
            }
        }
    }
}

/// Counters for a single shard
#[derive(Debug, Default)]
pub struct ShardStats {
    /// Calls that ran their work
    pub executions: AtomicU64,
    /// Calls that joined an in-flight execution
    pub joins: AtomicU64,
    /// Joined calls that gave up waiting
    pub timeouts: AtomicU64,
    /// Executions whose work panicked
    pub panics: AtomicU64,
    /// Calls rejected because the shard was closed
    pub rejected: AtomicU64,
}

/// An independent coalescing unit.
pub struct Shard<V, E> {
    calls: Mutex<FxHashMap<Box<str>, Arc<InFlightCall<V, E>>>>,
    /// Signalled whenever the registry becomes empty
    idle: Condvar,
    /// Only written with the registry lock held
    closed: AtomicBool,
    stats: ShardStats,
}

impl<V: Clone, E: Clone> Shard<V, E> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(FxHashMap::default()),
            idle: Condvar::new(),
            closed: AtomicBool::new(false),
            stats: ShardStats::default(),
        }
    }

    /// Run `work` for `key`, or join the execution already in flight for it.
    ///
    /// Joining callers wait at most `wait_timeout` when one is given. After
    /// [`close`](Self::close) every call returns [`FlightError::Closed`]
    /// without running `work`.
    pub fn execute<W>(&self, key: &str, wait_timeout: Option<Duration>, work: W) -> Outcome<V, E>
    where
        W: FnOnce() -> Result<V, E>,
    {
        let mut calls = self.calls.lock();
        if self.closed.load(Ordering::Relaxed) {
            drop(calls);
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            trace!(key, "rejecting call on closed shard");
            return Outcome {
                result: Err(FlightError::Closed),
                shared: true,
            };
        }
        if let Some(call) = calls.get(key) {
            let call = Arc::clone(call);
            call.waiters.fetch_add(1, Ordering::Relaxed);
            drop(calls);

            self.stats.joins.fetch_add(1, Ordering::Relaxed);
            trace!(key, "joining in-flight call");
            let result = call.wait(wait_timeout);
            if let Err(FlightError::Timeout(timeout)) = &result {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(key, ?timeout, "gave up waiting for in-flight call");
            }
            return Outcome {
                result,
                shared: true,
            };
        }

        let call = Arc::new(InFlightCall::new());
        calls.insert(Box::from(key), Arc::clone(&call));
        drop(calls);

        self.stats.executions.fetch_add(1, Ordering::Relaxed);
        trace!(key, "executing call");
        let guard = CompletionGuard {
            shard: self,
            key,
            call,
            waiters: None,
            armed: true,
        };
        let result = guard.finish(work());
        Outcome {
            result: result.map_err(FlightError::Work),
            shared: false,
        }
    }

    /// Remove `key` from the registry and return the final waiter count.
    fn release(&self, key: &str, call: &InFlightCall<V, E>) -> usize {
        let mut calls = self.calls.lock();
        calls.remove(key);
        if calls.is_empty() {
            self.idle.notify_all();
        }
        drop(calls);
        // Joins increment under the registry lock, so the count is final now.
        call.waiters.load(Ordering::Relaxed)
    }

    /// Number of calls currently in flight on this shard
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    #[cfg(test)]
    fn contains(&self, key: &str) -> bool {
        self.calls.lock().contains_key(key)
    }

    pub fn stats(&self) -> &ShardStats {
        &self.stats
    }

    /// Reject every call that has not registered yet. Calls already in flight
    /// and their waiters complete normally.
    pub fn close(&self) {
        let _calls = self.calls.lock();
        self.closed.store(true, Ordering::Relaxed);
    }

    /// Block until no call is in flight or `deadline` passes; `None` waits
    /// forever. Returns whether the shard is idle.
    pub fn wait_idle(&self, deadline: Option<Instant>) -> bool {
        let mut calls = self.calls.lock();
        while !calls.is_empty() {
            match deadline {
                None => self.idle.wait(&mut calls),
                Some(deadline) => {
                    if self.idle.wait_until(&mut calls, deadline).timed_out() {
                        return calls.is_empty();
                    }
                }
            }
        }
        true
    }
}

impl<V: Clone, E: Clone> Default for Shard<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Finishes an in-flight call exactly once, including when the work or the
/// clone of its result unwinds.
struct CompletionGuard<'a, V: Clone, E: Clone> {
    shard: &'a Shard<V, E>,
    key: &'a str,
    call: Arc<InFlightCall<V, E>>,
    /// Final waiter count, set once the entry has left the registry
    waiters: Option<usize>,
    /// Cleared only after waiters have been completed
    armed: bool,
}

impl<V: Clone, E: Clone> CompletionGuard<'_, V, E> {
    fn finish(mut self, result: Result<V, E>) -> Result<V, E> {
        let waiters = self.shard.release(self.key, &self.call);
        self.waiters = Some(waiters);
        if waiters > 0 {
            self.call.complete(Completion::Done(result.clone()));
        }
        self.armed = false;
        trace!(key = self.key, waiters, "call completed");
        result
    }
}

impl<V: Clone, E: Clone> Drop for CompletionGuard<'_, V, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let waiters = match self.waiters {
            Some(waiters) => waiters,
            None => self.shard.release(self.key, &self.call),
        };
        self.shard.stats.panics.fetch_add(1, Ordering::Relaxed);
        warn!(key = self.key, waiters, "call panicked, releasing waiters");
        self.call.complete(Completion::Panicked);
    }
}
