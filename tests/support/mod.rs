use std::thread;
use std::time::{Duration, Instant};

use shardflight_rs::{FlightConfig, ShardedFlight};

/// Upper bound for any condition a test waits on.
#[allow(dead_code)]
pub const WAIT_LIMIT: Duration = Duration::from_secs(10);

#[allow(dead_code)]
pub fn flight(shards: usize) -> ShardedFlight<u64, String> {
    ShardedFlight::new(FlightConfig::with_shards(shards)).expect("valid config")
}

/// Spin until `cond` holds, panicking after [`WAIT_LIMIT`].
#[allow(dead_code)]
pub fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Spin until `flight` has recorded at least `joins` joined calls.
#[allow(dead_code)]
pub fn wait_for_joins<V: Clone, E: Clone>(flight: &ShardedFlight<V, E>, joins: u64) {
    wait_for("callers to join", || flight.stats().joins >= joins);
}
