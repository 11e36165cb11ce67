//! # Sharded Flight Coordinator
//!
//! Ties the pieces together: compose the key, fingerprint it, select a shard,
//! and run the coalescing protocol on that shard.
//!
//! There is no lock across shards. Two calls with the same key always meet on
//! the same shard because composition, fingerprinting and selection are all
//! deterministic and the shard array never changes size.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use crate::config::{ConfigError, FlightConfig};
use crate::fingerprint::{Fingerprinter, Fnv1a};
use crate::key::{Concat, KeyComposer};
use crate::shard::{select_shard, Outcome, Shard};

/// Builder for a [`ShardedFlight`] with custom strategies.
///
/// Strategies that are not set fall back to [`Fnv1a`] and [`Concat`].
pub struct FlightBuilder {
    config: FlightConfig,
    fingerprinter: Option<Box<dyn Fingerprinter>>,
    composer: Option<Box<dyn KeyComposer>>,
}

impl FlightBuilder {
    pub fn new(config: FlightConfig) -> Self {
        Self {
            config,
            fingerprinter: None,
            composer: None,
        }
    }

    /// Replace the default fingerprint function
    pub fn fingerprinter<F>(mut self, fingerprinter: F) -> Self
    where
        F: Fingerprinter + 'static,
    {
        self.fingerprinter = Some(Box::new(fingerprinter));
        self
    }

    /// Replace the default key composer
    pub fn composer<C>(mut self, composer: C) -> Self
    where
        C: KeyComposer + 'static,
    {
        self.composer = Some(Box::new(composer));
        self
    }

    /// Validate the configuration and allocate the shards.
    pub fn build<V: Clone, E: Clone>(self) -> Result<ShardedFlight<V, E>, ConfigError> {
        self.config.validate()?;

        let shards = (0..self.config.shards).map(|_| Shard::new()).collect();
        debug!(
            shards = self.config.shards,
            wait_timeout_ms = ?self.config.wait_timeout_ms,
            custom_fingerprint = self.fingerprinter.is_some(),
            custom_composer = self.composer.is_some(),
            "sharded flight constructed"
        );

        Ok(ShardedFlight {
            shards,
            fingerprinter: self.fingerprinter.unwrap_or_else(|| Box::new(Fnv1a)),
            composer: self.composer.unwrap_or_else(|| Box::new(Concat)),
            wait_timeout: self.config.wait_timeout(),
            drain_timeout: self.config.drain_timeout(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Single-flight call coalescing, partitioned across a fixed set of shards.
///
/// Concurrent [`call`](Self::call)s whose key parts compose to the same key
/// run the work once; the other callers block and receive a copy of the
/// result. Values and errors are cloned per caller, so wrap large results in
/// `Arc`.
pub struct ShardedFlight<V, E> {
    shards: Box<[Shard<V, E>]>,
    fingerprinter: Box<dyn Fingerprinter>,
    composer: Box<dyn KeyComposer>,
    wait_timeout: Option<Duration>,
    drain_timeout: Duration,
    closed: AtomicBool,
}

impl<V: Clone, E: Clone> ShardedFlight<V, E> {
    /// Create a coordinator with the default strategies.
    pub fn new(config: FlightConfig) -> Result<Self, ConfigError> {
        FlightBuilder::new(config).build()
    }

    /// Execute `work` for the key composed from `parts`, or join the call
    /// already in flight for that key.
    ///
    /// `shared` on the outcome is `false` only for the caller that ran
    /// `work`. After [`close`](Self::close) every call returns
    /// [`FlightError::Closed`](crate::FlightError::Closed) without running
    /// anything.
    pub fn call<W>(&self, parts: &[&str], work: W) -> Outcome<V, E>
    where
        W: FnOnce() -> Result<V, E>,
    {
        let key = self.composer.compose(parts);
        let shard = &self.shards[self.shard_index(&key)];
        shard.execute(&key, self.wait_timeout, work)
    }

    /// Shard index the key composed from `parts` routes to
    pub fn shard_for(&self, parts: &[&str]) -> usize {
        self.shard_index(&self.composer.compose(parts))
    }

    #[inline]
    fn shard_index(&self, key: &str) -> usize {
        select_shard(
            self.fingerprinter.fingerprint(key.as_bytes()),
            self.shards.len(),
        )
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Calls currently in flight across all shards
    pub fn in_flight(&self) -> usize {
        self.shards.iter().map(|s| s.in_flight()).sum()
    }

    /// Stop accepting new calls. In-flight calls and their waiters complete
    /// normally. No call can register once this returns.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            for shard in self.shards.iter() {
                shard.close();
            }
            debug!(in_flight = self.in_flight(), "sharded flight closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for every shard to become idle. Returns whether
    /// all in-flight calls finished in time. `Duration::MAX` waits forever.
    #[instrument(skip(self), level = "debug")]
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let drained = self.shards.iter().all(|shard| shard.wait_idle(deadline));
        debug!(drained, in_flight = self.in_flight(), "drain finished");
        drained
    }

    /// Close, then drain for the configured drain timeout.
    pub fn shutdown(&self) -> bool {
        self.close();
        self.drain(self.drain_timeout)
    }

    /// Get aggregate statistics
    pub fn stats(&self) -> FlightStats {
        let mut stats = FlightStats::default();
        for shard in self.shards.iter() {
            let s = shard.stats();
            stats.executions += s.executions.load(Ordering::Relaxed);
            stats.joins += s.joins.load(Ordering::Relaxed);
            stats.timeouts += s.timeouts.load(Ordering::Relaxed);
            stats.panics += s.panics.load(Ordering::Relaxed);
            stats.rejected += s.rejected.load(Ordering::Relaxed);
            stats.in_flight += shard.in_flight();
        }
        stats.num_shards = self.shards.len();
        stats
    }

    /// Get per-shard `(index, executions, joins, in_flight)` for debugging
    pub fn shard_stats(&self) -> Vec<(usize, u64, u64, usize)> {
        self.shards
            .iter()
            .enumerate()
            .map(|(i, s)| {
                (
                    i,
                    s.stats().executions.load(Ordering::Relaxed),
                    s.stats().joins.load(Ordering::Relaxed),
                    s.in_flight(),
                )
            })
            .collect()
    }
}

/// Aggregate statistics across all shards
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlightStats {
    pub executions: u64,
    pub joins: u64,
    pub timeouts: u64,
    pub panics: u64,
    pub rejected: u64,
    pub in_flight: usize,
    pub num_shards: usize,
}

impl FlightStats {
    /// Fraction of calls served by joining another caller's execution
    pub fn coalesce_ratio(&self) -> f64 {
        let total = self.executions + self.joins;
        if total == 0 {
            0.0
        } else {
            self.joins as f64 / total as f64
        }
    }
}
