//! Configuration for the squall extractor.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
pub use squall_common::config::{MetricsConfig, QueueConfig, interpolate};

/// Configuration for the remote log source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the remote service's log-read API.
    pub base_url: String,
    /// Application whose request logs are fetched.
    pub app_name: String,
    /// Pre-provisioned session token; refreshed once on expiry.
    #[serde(default)]
    pub token: Option<String>,
    /// Application versions to fetch logs for.
    #[serde(default = "default_versions")]
    pub versions: Vec<String>,
    /// Minimum log level to fetch.
    #[serde(default = "default_min_level")]
    pub min_level: String,
    /// Timezone the source reports event times in.
    ///
    /// Envelope timestamps and day-bucketed destinations derive from this,
    /// never from the process-local timezone.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Environment tag carried in envelope fields and the record type.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Tags carried on every wire record.
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
}

fn default_versions() -> Vec<String> {
    vec!["1".to_string()]
}

fn default_min_level() -> String {
    "info".to_string()
}

fn default_timezone() -> String {
    "US/Pacific".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_tags() -> Vec<String> {
    vec!["gae".to_string()]
}

/// Window walking parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window slice size in seconds.
    #[serde(default = "default_slice_secs")]
    pub slice_secs: u64,
    /// Safety lag in seconds: log data newer than `now - safety_lag` is
    /// not treated as complete.
    #[serde(default = "default_safety_lag_secs")]
    pub safety_lag_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            slice_secs: default_slice_secs(),
            safety_lag_secs: default_safety_lag_secs(),
        }
    }
}

fn default_slice_secs() -> u64 {
    10
}

fn default_safety_lag_secs() -> u64 {
    180
}

/// Where extracted window batches go.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SinkMode {
    /// Push formatted records onto the replicated queue.
    #[default]
    Queue,
    /// Bulk-load directly into the index store.
    BulkIndex,
    /// Write formatted records to local day-named files only.
    File,
    /// Fire-and-forget datagrams only.
    SideChannel,
}

/// Sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SinkConfig {
    /// Primary sink for window batches.
    #[serde(default)]
    pub mode: SinkMode,
    /// When set, window batches are additionally written to day-named
    /// files under this directory (always on for `mode: file`).
    #[serde(default)]
    pub file_dir: Option<String>,
    /// Datagram address for the side channel.
    #[serde(default)]
    pub side_channel_addr: Option<String>,
}

/// Index store configuration, required for the bulk-index sink.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexConfig {
    /// Index store node URLs.
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Checkpoint persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory checkpoint files are written to, one per job name.
    #[serde(default = "default_checkpoint_dir")]
    pub dir: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: default_checkpoint_dir(),
        }
    }
}

fn default_checkpoint_dir() -> String {
    "/var/lib/squall".to_string()
}

/// Main configuration for squall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote log source.
    pub source: SourceConfig,
    /// Window walking parameters.
    #[serde(default)]
    pub windows: WindowConfig,
    /// Queue backends.
    pub queue: QueueConfig,
    /// Index store nodes.
    #[serde(default)]
    pub index: IndexConfig,
    /// Sink selection.
    #[serde(default)]
    pub sink: SinkConfig,
    /// Checkpoint persistence.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
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
        if self.source.app_name.is_empty() {
            return Err(ConfigError::EmptyAppName);
        }
        if self.queue.urls.is_empty() {
            return Err(ConfigError::EmptyQueueUrls);
        }
        if self.queue.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        if self.source.timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::UnknownTimezone {
                name: self.source.timezone.clone(),
            });
        }
        if self.sink.mode == SinkMode::BulkIndex && self.index.nodes.is_empty() {
            return Err(ConfigError::MissingIndexNodes);
        }
        if self.sink.mode == SinkMode::File && self.sink.file_dir.is_none() {
            return Err(ConfigError::MissingFileDir);
        }
        Ok(())
    }

    /// The configured source timezone.
    ///
    /// Only valid after `validate()`; unknown names fail at load time.
    pub fn tz(&self) -> Tz {
        self.source
            .timezone
            .parse()
            .expect("timezone validated at load time")
    }

    /// Record type tag carried on every envelope.
    pub fn record_type(&self) -> String {
        format!("{}-{}", self.source.app_name, self.source.environment)
    }
}

/// Derive a job identity from a config file path, so multiple jobs never
/// share one checkpoint file.
pub fn job_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "squall".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn minimal_yaml() -> &'static str {
        r#"
source:
  base_url: "https://myapp.example.com"
  app_name: myapp
queue:
  urls:
    - "redis://10.0.0.1:6379"
    - "redis://10.0.0.2:6379"
  namespace: app_log
"#
    }

    #[test]
    fn parse_minimal_config_applies_defaults() {
        let config = Config::parse(minimal_yaml()).unwrap();

        assert_eq!(config.source.versions, vec!["1".to_string()]);
        assert_eq!(config.source.min_level, "info");
        assert_eq!(config.source.timezone, "US/Pacific");
        assert_eq!(config.windows.slice_secs, 10);
        assert_eq!(config.windows.safety_lag_secs, 180);
        assert_eq!(config.sink.mode, SinkMode::Queue);
        assert_eq!(config.queue.format, "raw");
        assert_eq!(config.checkpoint.dir, "/var/lib/squall");
        assert_eq!(config.record_type(), "myapp-production");
    }

    #[test]
    fn bulk_index_sink_requires_nodes() {
        let yaml = r#"
source:
  base_url: "https://myapp.example.com"
  app_name: myapp
queue:
  urls: ["redis://10.0.0.1:6379"]
  namespace: app_log
sink:
  mode: bulk-index
"#;
        let err = Config::parse(yaml).expect_err("missing index nodes");
        assert!(matches!(err, ConfigError::MissingIndexNodes));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let yaml = minimal_yaml().replace("app_name: myapp", "app_name: myapp\n  timezone: Mars/Olympus");
        let err = Config::parse(&yaml).expect_err("unknown timezone");
        assert!(matches!(err, ConfigError::UnknownTimezone { .. }));
    }

    #[test]
    fn empty_queue_urls_are_rejected() {
        let yaml = r#"
source:
  base_url: "https://myapp.example.com"
  app_name: myapp
queue:
  urls: []
  namespace: app_log
"#;
        let err = Config::parse(yaml).expect_err("no queue urls");
        assert!(matches!(err, ConfigError::EmptyQueueUrls));
    }

    #[test]
    fn job_name_derives_from_file_stem() {
        let path = PathBuf::from("/etc/squall/fetcher.conf.myapp-backend.yaml");
        assert_eq!(job_name_from_path(&path), "fetcher.conf.myapp-backend");
    }
}
