//! Pelican: Bulk indexing consumer for the log queue.
//!
//! This crate handles:
//! - Draining the intermediate queue in fixed-size batches
//! - Deriving the target index from each batch's record timestamps
//! - Bulk-loading batches into the search index store with bounded
//!   retries, so sink slowness degrades throughput, not correctness

pub mod config;
pub mod drain;
pub mod error;
pub mod metrics;

// Re-export commonly used items
pub use config::Config;
pub use drain::{Drain, DrainStats};
pub use error::PipelineError;

// Re-export from squall-common
pub use squall_common::{init_metrics, init_tracing, shutdown_signal};
