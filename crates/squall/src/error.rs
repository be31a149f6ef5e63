//! Error types for the squall extractor.

use snafu::prelude::*;

// Re-export common errors
pub use squall_common::error::{ConfigError, IndexError, MetricsError, TransportError};

/// Errors that can occur while paging the remote log source.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// The source rejected the session credential.
    ///
    /// Token expiry is expected; callers retry session setup once.
    #[snafu(display("Source session credential rejected"))]
    AuthExpired,

    /// The HTTP client could not be constructed.
    #[snafu(display("Failed to build source HTTP client: {source}"))]
    ClientBuild { source: reqwest::Error },

    /// The page request failed at the transport level.
    #[snafu(display("Page request failed: {source}"))]
    PageRequest { source: reqwest::Error },

    /// The source answered with an unexpected status.
    #[snafu(display("Source rejected page request with status {status}"))]
    PageRejected { status: u16 },

    /// The page body could not be decoded.
    #[snafu(display("Failed to decode page: {source}"))]
    PageDecode { source: reqwest::Error },

    /// Session refresh failed.
    #[snafu(display("Session refresh failed: {source}"))]
    SessionRefresh { source: reqwest::Error },
}

/// Errors that can occur while persisting or loading a checkpoint.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckpointError {
    /// Failed to create the checkpoint directory.
    #[snafu(display("Failed to create checkpoint directory: {source}"))]
    CreateDir { source: std::io::Error },

    /// Failed to write the checkpoint temp file.
    #[snafu(display("Failed to write checkpoint: {source}"))]
    WriteTemp { source: std::io::Error },

    /// Failed to swap the temp file into place.
    #[snafu(display("Failed to swap checkpoint into place: {source}"))]
    Swap { source: std::io::Error },
}

/// Errors that can occur while delivering a window batch to a sink.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Queue transport failure.
    #[snafu(display("Queue write failed: {source}"))]
    QueueWrite { source: TransportError },

    /// Bulk index failure.
    #[snafu(display("Bulk index failed: {source}"))]
    BulkIndex { source: IndexError },

    /// Local file write failure.
    #[snafu(display("Local file write failed: {source}"))]
    FileWrite { source: std::io::Error },
}

/// Errors that abandon one window; the loop logs them and continues.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WindowError {
    /// Paging the source failed.
    #[snafu(display("Fetch failed: {source}"))]
    Fetch { source: FetchError },

    /// Delivering the batch failed.
    #[snafu(display("Sink delivery failed: {source}"))]
    Deliver { source: SinkError },
}

/// Top-level pipeline errors. Only startup problems are fatal.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Transport setup error.
    #[snafu(display("Transport error: {source}"))]
    Transport { source: TransportError },

    /// Index client setup error.
    #[snafu(display("Index error: {source}"))]
    Index { source: IndexError },

    /// Source client setup error.
    #[snafu(display("Source error: {source}"))]
    Source { source: FetchError },

    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<TransportError> for PipelineError {
    fn from(source: TransportError) -> Self {
        PipelineError::Transport { source }
    }
}

impl From<IndexError> for PipelineError {
    fn from(source: IndexError) -> Self {
        PipelineError::Index { source }
    }
}

impl From<FetchError> for PipelineError {
    fn from(source: FetchError) -> Self {
        PipelineError::Source { source }
    }
}

impl From<MetricsError> for PipelineError {
    fn from(source: MetricsError) -> Self {
        PipelineError::Metrics { source }
    }
}
