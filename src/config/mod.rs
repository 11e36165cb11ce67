//! Configuration for sharded flight coordinators.
//!
//! Configuration is loaded with precedence: CLI overrides > Env vars > Config file > Defaults
//!
//! # Example config file (shardflight.toml)
//! ```toml
//! shards = 64
//! wait_timeout_ms = 2000
//! drain_timeout_ms = 10000
//! ```
//!
//! The same keys can be set from the environment with the `SHARDFLIGHT_`
//! prefix, e.g. `SHARDFLIGHT_SHARDS=64`.

mod defaults;

pub use defaults::*;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Construction parameters for a [`ShardedFlight`](crate::ShardedFlight).
///
/// Fingerprint and key composer overrides are code rather than data and are
/// supplied through [`FlightBuilder`](crate::FlightBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    /// Number of independent coalescing shards (at least 1)
    pub shards: usize,
    /// How long a joining caller waits for an in-flight call before giving
    /// up. Unset means wait until the call completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,
    /// Upper bound on how long `shutdown` waits for in-flight calls
    pub drain_timeout_ms: u64,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            wait_timeout_ms: None,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl FlightConfig {
    /// Default configuration with a specific shard count
    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards,
            ..Default::default()
        }
    }

    /// Load configuration with precedence: CLI overrides > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(FlightConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with SHARDFLIGHT_ prefix
        figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]));

        // Layer 3: CLI overrides
        figment = figment.merge(Serialized::defaults(overrides));

        let config: FlightConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards == 0 {
            return Err(ConfigError::InvalidShardCount(self.shards));
        }
        if self.wait_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidWaitTimeout);
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shards: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain_timeout_ms: Option<u64>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: shard count must be at least 1, got {0}")]
    InvalidShardCount(usize),
    #[error("configuration error: wait timeout must be positive when set")]
    InvalidWaitTimeout,
    #[error("configuration error: {0}")]
    Load(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}
