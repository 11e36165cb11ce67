//! # Shardflight
//!
//! Sharded single-flight call coalescing.
//!
//! When many threads ask for the result of the same expensive operation at
//! once, only one execution runs; the rest block and share its result, whether
//! that is a value or an error. Keys are partitioned across independent shards
//! so unrelated keys never contend on the same lock.
//!
//! ```
//! use shardflight_rs::{FlightConfig, ShardedFlight};
//!
//! let flight: ShardedFlight<u64, String> = ShardedFlight::new(FlightConfig::with_shards(4))?;
//! let outcome = flight.call(&["user:", "42"], || Ok(42));
//! assert_eq!(outcome.result, Ok(42));
//! assert!(!outcome.shared);
//! # Ok::<(), shardflight_rs::ConfigError>(())
//! ```
//!
//! Completed results are not retained: this is not a cache.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod flight;
pub mod key;
pub mod shard;

// Re-export main types for convenience
pub use config::{ConfigError, ConfigOverrides, FlightConfig};
pub use error::FlightError;
pub use fingerprint::{Fingerprinter, Fnv1a, FxFingerprint};
pub use flight::{FlightBuilder, FlightStats, ShardedFlight};
pub use key::{Concat, KeyComposer};
pub use shard::{select_shard, Outcome};
