//! Tailing configuration
//!
//! Timing and sizing knobs of a tail session, loadable from a TOML file.
//! Every key is optional; missing keys take the defaults below.
//!
//! # cwtail.toml Format
//!
//! ```toml
//! renewal_interval_ms = 15000
//! fetch_interval_ms = 250
//! discovery_page_delay_ms = 100
//! dedup_size_limit = 50000
//! dedup_ttl_secs = 60
//! channel_capacity = 100
//! filter_pattern = "ERROR"
//! ```

#![warn(clippy::all, rust_2018_idioms)]

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Capacity of the event output channel
pub const OUTPUT_CHANNEL_CAPACITY: usize = 100;

/// Timing and sizing configuration of a tail session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// How often the stream set is re-discovered while tailing
    pub renewal_interval_ms: u64,
    /// How often a fetch cycle runs while tailing
    pub fetch_interval_ms: u64,
    /// Pause between stream listing pages
    pub discovery_page_delay_ms: u64,
    /// Entry count that triggers a dedup sweep; non-positive selects the default
    pub dedup_size_limit: i64,
    /// Age after which dedup entries may be swept; 0 selects the default
    pub dedup_ttl_secs: u64,
    /// Pending events buffered before fetching stalls
    pub channel_capacity: usize,
    /// Optional CloudWatch Logs filter pattern applied to every fetch
    pub filter_pattern: Option<String>,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            renewal_interval_ms: 15_000,
            fetch_interval_ms: 250,
            discovery_page_delay_ms: 100,
            dedup_size_limit: 50_000,
            dedup_ttl_secs: 60,
            channel_capacity: OUTPUT_CHANNEL_CAPACITY,
            filter_pattern: None,
        }
    }
}

impl TailConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        trace_debug!("Loaded tail config from {:?}: {:?}", path, config);
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn renewal_interval(&self) -> Duration {
        Duration::from_millis(self.renewal_interval_ms.max(1))
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms.max(1))
    }

    pub fn discovery_page_delay(&self) -> Duration {
        Duration::from_millis(self.discovery_page_delay_ms)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    /// Channel capacity, at least one slot
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }

    /// Set both periodic intervals
    pub fn with_intervals(mut self, renewal: Duration, fetch: Duration) -> Self {
        self.renewal_interval_ms = u64::try_from(renewal.as_millis()).unwrap_or(u64::MAX);
        self.fetch_interval_ms = u64::try_from(fetch.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the pause between listing pages
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.discovery_page_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set filter pattern
    pub fn with_filter_pattern(mut self, pattern: String) -> Self {
        self.filter_pattern = Some(pattern);
        self
    }
}
