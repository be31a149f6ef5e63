//! Common configuration types shared between squall and pelican.

mod vars;

pub use vars::{InterpolationResult, interpolate};

use serde::{Deserialize, Serialize};

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Queue configuration shared by the producer and the consumer.
///
/// Each URL names one independent queue backend instance; the namespace is
/// the list key records are pushed onto and popped from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue backend URLs (e.g. "redis://10.0.0.1:6379").
    pub urls: Vec<String>,
    /// List key that queued records are pushed onto.
    pub namespace: String,
    /// Default wire format for queued records.
    #[serde(default = "default_queue_format")]
    pub format: String,
}

fn default_queue_format() -> String {
    "raw".to_string()
}
