use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Timing parameters of the per-service long-poll loop
///
/// The loop issues one short query at start, then one long-poll query per
/// tick of `poll_interval_in_ms`. The tick only throttles how often a new
/// attempt starts; each attempt may block up to `long_poll_timeout_in_ms`.
///
/// ```toml
/// [watch]
/// poll_interval_in_ms = 1000
/// long_poll_timeout_in_ms = 120000
/// wait_time_in_secs = 55
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Deadline of the first query (`since_index = 0`)
    #[serde(default = "default_initial_query_timeout")]
    pub initial_query_timeout_in_ms: u64,

    /// Period of the ticker gating long-poll attempts
    #[serde(default = "default_poll_interval")]
    pub poll_interval_in_ms: u64,

    /// Client-side deadline of one long-poll attempt
    #[serde(default = "default_long_poll_timeout")]
    pub long_poll_timeout_in_ms: u64,

    /// Pause after a failed attempt before the next cycle
    #[serde(default = "default_retry_delay")]
    pub retry_delay_in_ms: u64,

    /// How long the directory may hold a query open (0 = server default)
    #[serde(default = "default_wait_time")]
    pub wait_time_in_secs: u64,

    /// Only return instances whose health checks pass
    #[serde(default = "default_passing_only")]
    pub passing_only: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            initial_query_timeout_in_ms: default_initial_query_timeout(),
            poll_interval_in_ms: default_poll_interval(),
            long_poll_timeout_in_ms: default_long_poll_timeout(),
            retry_delay_in_ms: default_retry_delay(),
            wait_time_in_secs: default_wait_time(),
            passing_only: default_passing_only(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_query_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "initial_query_timeout_in_ms must be > 0".into(),
            )));
        }

        if self.poll_interval_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "poll_interval_in_ms must be > 0".into(),
            )));
        }

        if self.retry_delay_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "retry_delay_in_ms must be > 0".into(),
            )));
        }

        // The client deadline must leave room for the server to answer a full wait.
        if self.long_poll_timeout_in_ms <= self.wait_time_in_secs.saturating_mul(1000) {
            return Err(Error::Config(ConfigError::Message(format!(
                "long_poll_timeout_in_ms {} must exceed wait_time_in_secs {}s",
                self.long_poll_timeout_in_ms, self.wait_time_in_secs
            ))));
        }

        Ok(())
    }

    pub fn initial_query_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_query_timeout_in_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_in_ms)
    }

    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_timeout_in_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_in_ms)
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_in_secs)
    }
}

fn default_initial_query_timeout() -> u64 {
    10_000
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_long_poll_timeout() -> u64 {
    120_000
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_wait_time() -> u64 {
    55
}
fn default_passing_only() -> bool {
    true
}
