//! Database configuration.
//!
//! Every field has a default, so `{}` is a complete configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vela_core::{Error, Result};
use vela_reactive::QueryCacheConfig;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Number of change events each collection retains
    #[serde(default = "default_change_buffer_capacity")]
    pub change_buffer_capacity: usize,

    /// Query cache replacement settings
    #[serde(default)]
    pub query_cache: QueryCacheSettings,

    /// Capacity of each collection's write notification channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

/// Query cache replacement settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct QueryCacheSettings {
    /// Number of cached queries kept before idle ones are evicted
    #[serde(default = "default_try_to_keep_max")]
    pub try_to_keep_max: usize,

    /// Never-executed queries younger than this are not evicted
    #[serde(default = "default_unexecuted_lifetime_ms")]
    pub unexecuted_lifetime_ms: u64,
}

impl QueryCacheSettings {
    pub fn to_cache_config(&self) -> QueryCacheConfig {
        QueryCacheConfig {
            try_to_keep_max: self.try_to_keep_max,
            unexecuted_lifetime: Duration::from_millis(self.unexecuted_lifetime_ms),
        }
    }
}

impl Default for QueryCacheSettings {
    fn default() -> Self {
        Self {
            try_to_keep_max: default_try_to_keep_max(),
            unexecuted_lifetime_ms: default_unexecuted_lifetime_ms(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            change_buffer_capacity: default_change_buffer_capacity(),
            query_cache: QueryCacheSettings::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_change_buffer_capacity() -> usize {
    100
}

fn default_try_to_keep_max() -> usize {
    100
}

fn default_unexecuted_lifetime_ms() -> u64 {
    30_000
}

fn default_event_channel_capacity() -> usize {
    1024
}

impl DatabaseConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.change_buffer_capacity == 0 {
            return Err(Error::invalid_config("change_buffer_capacity must be at least 1"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::invalid_config("event_channel_capacity must be at least 1"));
        }
        if self.query_cache.try_to_keep_max == 0 {
            tracing::warn!("query_cache.try_to_keep_max is 0, idle queries are evicted immediately");
        }
        Ok(())
    }
}
