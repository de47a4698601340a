//! Client configuration.
//!
//! Loaded from TOML; every field has a default, so an empty file is valid.
//! Durations are plain milliseconds.
//!
//! ```toml
//! [producer]
//! group = "order-producer"
//! send_timeout_ms = 3000
//! retry_times_when_send_async_failed = 0
//!
//! [consumer]
//! group = "order-consumer"
//! batch_size = 1
//! max_active_lanes = 20
//! start_position = "earliest"
//! auto_commit = true
//! ```

use crate::error::{ClientError, Result};
use crate::router::SignNormalization;
use crate::scheduler::{ShutdownPolicy, StartPosition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
}

impl ClientConfig {
    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ClientError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ClientConfig =
            toml::from_str(contents).map_err(|e| ClientError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ClientError::ConfigError(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.producer.validate()?;
        self.consumer.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Producer group name, reported in logs.
    pub group: String,

    /// Default bound on a synchronous send.
    pub send_timeout_ms: u64,

    /// Resends of a failed non-ordered asynchronous send.
    pub retry_times_when_send_async_failed: usize,

    /// First backoff between asynchronous resends.
    pub retry_backoff_ms: u64,

    pub directory_refresh_interval_ms: u64,

    /// How long `shutdown` waits for outstanding asynchronous sends.
    pub shutdown_timeout_ms: u64,

    pub sign_normalization: SignNormalization,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            group: "default-producer-group".to_string(),
            send_timeout_ms: 3000,
            retry_times_when_send_async_failed: 0,
            retry_backoff_ms: 100,
            directory_refresh_interval_ms: 30_000,
            shutdown_timeout_ms: 5000,
            sign_normalization: SignNormalization::default(),
        }
    }
}

impl ProducerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn directory_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.directory_refresh_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.send_timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "producer.send_timeout_ms must be positive".to_string(),
            ));
        }
        if self.directory_refresh_interval_ms == 0 {
            return Err(ClientError::ConfigError(
                "producer.directory_refresh_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub group: String,

    /// Most messages handed to the handler in one batch.
    pub batch_size: usize,

    /// Partitions allowed to fetch or deliver at the same time.
    pub max_active_lanes: usize,

    pub fetch_timeout_ms: u64,

    /// Pause after an empty or failed fetch.
    pub idle_backoff_ms: u64,

    /// Failed deliveries of one batch before it is given up on.
    pub max_reconsume_times: u32,

    /// First pause before redelivering a failed batch.
    pub retry_backoff_ms: u64,

    pub auto_commit: bool,

    pub start_position: StartPosition,

    pub shutdown_policy: ShutdownPolicy,

    /// Bound on draining in-flight deliveries at stop. Unbounded when absent.
    pub drain_timeout_ms: Option<u64>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group: "default-consumer-group".to_string(),
            batch_size: 1,
            max_active_lanes: 20,
            fetch_timeout_ms: 3000,
            idle_backoff_ms: 100,
            max_reconsume_times: 16,
            retry_backoff_ms: 1000,
            auto_commit: true,
            start_position: StartPosition::default(),
            shutdown_policy: ShutdownPolicy::default(),
            drain_timeout_ms: None,
        }
    }
}

impl ConsumerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClientError::ConfigError(
                "consumer.batch_size must be positive".to_string(),
            ));
        }
        if self.max_active_lanes == 0 {
            return Err(ClientError::ConfigError(
                "consumer.max_active_lanes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
