//! Configuration for the pelican consumer.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
pub use squall_common::config::{MetricsConfig, interpolate};

/// The queue instance this consumer drains.
///
/// Each consumer instance drains one backend; scale-out is one consumer
/// per queue instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerQueueConfig {
    /// Queue backend URL.
    #[serde(default = "default_queue_url")]
    pub url: String,
    /// List key records are popped from.
    pub namespace: String,
}

fn default_queue_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Index store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index store node URLs.
    #[serde(default = "default_index_nodes")]
    pub nodes: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            nodes: default_index_nodes(),
        }
    }
}

fn default_index_nodes() -> Vec<String> {
    vec!["http://127.0.0.1:9200".to_string()]
}

/// Drain loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Records accumulated before a bulk flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Sleep between polls of an empty queue, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_poll_interval_secs() -> u64 {
    1
}

/// Main configuration for pelican.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Queue to drain.
    pub queue: ConsumerQueueConfig,
    /// Index store nodes.
    #[serde(default)]
    pub index: IndexConfig,
    /// Drain loop parameters.
    #[serde(default)]
    pub drain: DrainConfig,
    /// Metrics endpoint.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { source })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let result = interpolate(contents);
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }

        let config: Config = serde_yaml::from_str(&result.text)
            .map_err(|source| ConfigError::YamlParse { source })?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.index.nodes.is_empty() {
            return Err(ConfigError::MissingIndexNodes);
        }
        Ok(())
    }
}
