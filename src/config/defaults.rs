//! Default constants for sharded flight configuration.

/// Default number of shards.
/// Enough to keep lock contention low on typical core counts.
pub const DEFAULT_SHARDS: usize = 16;

/// Default time `shutdown` waits for in-flight calls to finish (milliseconds)
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 30_000;

/// Environment variable prefix for configuration keys
pub const ENV_PREFIX: &str = "SHARDFLIGHT_";

/// Environment variable naming a config file
pub const ENV_CONFIG_PATH: &str = "SHARDFLIGHT_CONFIG";
