//! Errors delivered to callers of a coalesced call.

use std::time::Duration;

/// Failure outcome of [`ShardedFlight::call`](crate::ShardedFlight::call).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlightError<E> {
    /// The work ran and returned an error. Every coalesced caller receives a
    /// copy of the same error.
    #[error("work failed: {0}")]
    Work(E),
    /// The executing caller's work panicked before producing a result.
    #[error("work panicked before completing")]
    Panicked,
    /// This waiter gave up before the in-flight call completed. The call
    /// itself keeps running.
    #[error("timed out after {0:?} waiting for in-flight call")]
    Timeout(Duration),
    /// The coordinator was closed before this call started.
    #[error("sharded flight is closed")]
    Closed,
}

impl<E> FlightError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FlightError::Timeout(_))
    }
}
