//! Configuration for the partline CLI
//!
//! One TOML file carries the client sections (`[producer]`, `[consumer]`)
//! and a `[demo]` section describing the in-process broker the commands run
//! against.

use anyhow::{bail, Context, Result};
use partline_client::{ClientConfig, DEFAULT_DELAY_LEVELS};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub client: ClientConfig,

    pub demo: DemoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub simple_topic: String,
    pub orderly_topic: String,
    pub delay_topic: String,

    /// Partitions created for every demo topic.
    pub partitions: u32,

    /// Delay-level table of the in-process broker.
    pub delay_levels: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            simple_topic: "simple-topic".to_string(),
            orderly_topic: "orderly-topic".to_string(),
            delay_topic: "delay-topic".to_string(),
            partitions: 4,
            delay_levels: DEFAULT_DELAY_LEVELS.to_string(),
        }
    }
}

impl DemoConfig {
    pub fn topics(&self) -> [&str; 3] {
        [&self.simple_topic, &self.orderly_topic, &self.delay_topic]
    }
}

impl Config {
    /// Load config from `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.client.validate()?;
        if config.demo.partitions == 0 {
            bail!("demo.partitions must be positive");
        }
        Ok(config)
    }
}
