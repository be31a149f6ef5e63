//! Common error types shared between squall and pelican.

use snafu::prelude::*;

// ============ Transport Errors ============

/// Errors that can occur on the replicated queue transport.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    /// The backend URL could not be parsed by the queue client.
    #[snafu(display("Invalid queue URL {url}: {source}"))]
    InvalidUrl {
        url: String,
        source: redis::RedisError,
    },

    /// The selected connection exhausted its connect retries and is invalid.
    #[snafu(display("Queue connection {backend} is invalid"))]
    ConnectionInvalid { backend: String },

    /// A pipelined batch flush failed after the batch was queued.
    ///
    /// Callers must not assume partial success.
    #[snafu(display("Batch flush to {backend} failed: {source}"))]
    FlushFailed {
        backend: String,
        source: redis::RedisError,
    },

    /// A queue round-trip did not complete within the socket timeout.
    #[snafu(display("Queue call to {backend} timed out"))]
    CallTimeout { backend: String },

    /// A pop from the queue failed.
    #[snafu(display("Pop from {backend} failed: {source}"))]
    PopFailed {
        backend: String,
        source: redis::RedisError,
    },

    /// No backends were configured for the transport.
    #[snafu(display("No queue backends configured"))]
    NoBackends,
}

// ============ Index Errors ============

/// Errors that can occur while bulk-loading into the index store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IndexError {
    /// The HTTP client could not be constructed.
    #[snafu(display("Failed to build index HTTP client: {source}"))]
    ClientBuild { source: reqwest::Error },

    /// The bulk request could not be sent.
    #[snafu(display("Bulk request to {node} failed: {source}"))]
    BulkRequest {
        node: String,
        source: reqwest::Error,
    },

    /// The index store answered with a non-success status.
    #[snafu(display("Bulk request to {node} rejected with status {status}"))]
    BulkRejected { node: String, status: u16 },

    /// The bulk response body could not be parsed.
    #[snafu(display("Bulk response from {node} unreadable: {source}"))]
    BulkResponse {
        node: String,
        source: reqwest::Error,
    },

    /// One or more sub-batches failed mid-bulk.
    ///
    /// `flushed` actions made it in before the failure; the remainder did not.
    #[snafu(display("Bulk load partially failed: {failed} of {total} actions rejected ({flushed} flushed)"))]
    PartialFailure {
        failed: usize,
        total: usize,
        flushed: usize,
    },

    /// No index nodes were configured.
    #[snafu(display("No index nodes configured"))]
    NoNodes,
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Queue URL list is empty.
    #[snafu(display("At least one queue URL must be configured"))]
    EmptyQueueUrls,

    /// Queue namespace is empty.
    #[snafu(display("Queue namespace cannot be empty"))]
    EmptyNamespace,

    /// Application name is empty.
    #[snafu(display("Application name cannot be empty"))]
    EmptyAppName,

    /// The configured timezone is not a known zone name.
    #[snafu(display("Unknown timezone: {name}"))]
    UnknownTimezone { name: String },

    /// Index nodes are required for the configured sink.
    #[snafu(display("Index nodes must be configured for the bulk-index sink"))]
    MissingIndexNodes,

    /// A file directory is required for the file sink.
    #[snafu(display("An output directory must be configured for the file sink"))]
    MissingFileDir,
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics already initialized.
    #[snafu(display("Metrics already initialized"))]
    AlreadyInitialized,

    /// Metrics not initialized.
    #[snafu(display("Metrics not initialized"))]
    NotInitialized,
}
