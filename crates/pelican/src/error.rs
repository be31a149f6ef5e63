//! Error types for the pelican consumer.

use snafu::prelude::*;

// Re-export common errors
pub use squall_common::error::{ConfigError, IndexError, MetricsError, TransportError};

/// Top-level pipeline errors. Only startup problems are fatal; the drain
/// loop handles everything else in place.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Queue connection setup error.
    #[snafu(display("Transport error: {source}"))]
    Transport { source: TransportError },

    /// Index client setup error.
    #[snafu(display("Index error: {source}"))]
    Index { source: IndexError },

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

impl From<MetricsError> for PipelineError {
    fn from(source: MetricsError) -> Self {
        PipelineError::Metrics { source }
    }
}
