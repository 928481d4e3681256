//! Configuration types for schedules and value stores.
//!
//! Loading configuration from files or the environment is left to the
//! embedding application; these types only describe, default and validate it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::data::ChannelFilter;
use crate::{Error, Result};

/// Default read interval (1 second).
pub const DEFAULT_INTERVAL_MS: u64 = 1_000;

/// Default timeout for reading all sources of one cycle (1 second).
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

/// Default number of sources read concurrently.
pub const DEFAULT_MAX_CONCURRENT_SOURCE_READS: usize = 5;

/// Default timeout for stopping the adapter on close (1 second).
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 1_000;

/// Default number of cycle results buffered for a slow consumer.
pub const DEFAULT_RESULT_CHANNEL_SIZE: usize = 10;

/// Configuration of one read schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Schedule name, used in log output.
    pub name: String,
    /// Read interval in milliseconds.
    pub interval_ms: u64,
    /// Deadline for one complete read cycle in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of sources read at the same time.
    pub max_concurrent_source_reads: usize,
    /// Timeout passed to the adapter when the schedule is closed.
    pub stop_timeout_ms: u64,
    /// Number of cycle results buffered before the scheduler waits for the consumer.
    pub result_channel_size: usize,
    /// Channels to read per source ID. An empty list or `["*"]` reads all channels.
    pub sources: HashMap<String, Vec<String>>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            interval_ms: DEFAULT_INTERVAL_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_concurrent_source_reads: DEFAULT_MAX_CONCURRENT_SOURCE_READS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
            result_channel_size: DEFAULT_RESULT_CHANNEL_SIZE,
            sources: HashMap::new(),
        }
    }
}

impl ScheduleConfig {
    /// Create a configuration for a named schedule with default timing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a source with its channel list.
    pub fn with_source<I, S>(mut self, source_id: impl Into<String>, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources.insert(
            source_id.into(),
            channels.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = duration_ms(interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_max_concurrent_source_reads(mut self, max: usize) -> Self {
        self.max_concurrent_source_reads = max;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Channel filters per source, with wildcards and duplicates resolved.
    pub fn channel_filters(&self) -> HashMap<String, ChannelFilter> {
        self.sources
            .iter()
            .map(|(source_id, channels)| {
                (source_id.clone(), ChannelFilter::from_list(channels.iter().cloned()))
            })
            .collect()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("schedule name must not be empty"));
        }
        if self.interval_ms == 0 {
            return Err(Error::config(format!(
                "schedule \"{}\": interval_ms must be greater than 0",
                self.name
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::config(format!(
                "schedule \"{}\": timeout_ms must be greater than 0",
                self.name
            )));
        }
        if self.max_concurrent_source_reads == 0 {
            return Err(Error::config(format!(
                "schedule \"{}\": max_concurrent_source_reads must be greater than 0",
                self.name
            )));
        }
        if self.result_channel_size == 0 {
            return Err(Error::config(format!(
                "schedule \"{}\": result_channel_size must be greater than 0",
                self.name
            )));
        }
        if let Some(source_id) = self.sources.keys().find(|id| id.trim().is_empty()) {
            return Err(Error::config(format!(
                "schedule \"{}\": invalid source ID \"{}\"",
                self.name, source_id
            )));
        }
        Ok(())
    }
}

/// How an event-driven source buffers values between reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadMode {
    /// Keep only the latest value per channel.
    #[default]
    KeepLast,
    /// Keep all values per channel, subject to the retention limits.
    KeepAll,
}

impl std::fmt::Display for ReadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadMode::KeepLast => write!(f, "KeepLast"),
            ReadMode::KeepAll => write!(f, "KeepAll"),
        }
    }
}

/// Configuration of the value stores of event-driven sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub read_mode: ReadMode,
    /// Maximum number of values kept per channel (0 = unlimited). Only used for `KeepAll`.
    pub max_retain_size: usize,
    /// Maximum age of kept values in milliseconds (0 = unlimited). Only used for `KeepAll`.
    pub max_retain_period_ms: u64,
}

impl StoreConfig {
    pub fn keep_all(max_retain_size: usize, max_retain_period: Duration) -> Self {
        Self {
            read_mode: ReadMode::KeepAll,
            max_retain_size,
            max_retain_period_ms: duration_ms(max_retain_period),
        }
    }

    pub fn max_retain_period(&self) -> Duration {
        Duration::from_millis(self.max_retain_period_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_config_default() {
        let config = ScheduleConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.timeout(), Duration::from_secs(1));
        assert_eq!(config.max_concurrent_source_reads, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_schedule_config_deserialize_with_defaults() {
        let config: ScheduleConfig = serde_json::from_str(
            r#"{
                "name": "fast",
                "interval_ms": 250,
                "sources": { "plc-1": ["*"], "plc-2": ["b", "a", "a"] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.name, "fast");
        assert_eq!(config.interval(), Duration::from_millis(250));
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);

        let filters = config.channel_filters();
        assert!(filters["plc-1"].is_all());
        assert_eq!(
            filters["plc-2"],
            ChannelFilter::from_list(["a", "b"])
        );
    }

    #[test]
    fn test_schedule_config_validation() {
        assert!(ScheduleConfig::new("").validate().is_err());
        assert!(
            ScheduleConfig::new("s")
                .with_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ScheduleConfig::new("s")
                .with_max_concurrent_source_reads(0)
                .validate()
                .is_err()
        );
        let err = ScheduleConfig::new("s")
            .with_source(" ", ["a"])
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_store_config_deserialize() {
        let config: StoreConfig = serde_json::from_str(
            r#"{ "read_mode": "KeepAll", "max_retain_size": 100 }"#,
        )
        .unwrap();
        assert_eq!(config.read_mode, ReadMode::KeepAll);
        assert_eq!(config.max_retain_size, 100);
        assert_eq!(config.max_retain_period(), Duration::ZERO);

        let default: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(default.read_mode, ReadMode::KeepLast);
    }
}
