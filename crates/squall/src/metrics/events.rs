//! Internal events for extractor metrics emission.
//!
//! Each event struct represents a measurable occurrence in the extraction
//! loop. Events implement the shared `InternalEvent` trait which emits the
//! corresponding Prometheus metric.
//!
//! ## Job Labels
//!
//! Metrics include a `job` label so concurrent backfill and tailing
//! instances stay distinguishable.

use metrics::{counter, gauge};
use tracing::trace;

use squall_common::metrics::InternalEvent;

/// Event emitted when a window's batch was delivered.
pub struct WindowProcessed {
    /// Job identity for multi-instance deployments.
    pub job: String,
    /// Records shipped for the window.
    pub records: u64,
}

impl InternalEvent for WindowProcessed {
    fn emit(self) {
        trace!(job = %self.job, records = self.records, "Window processed");
        counter!("squall_windows_processed_total", "job" => self.job.clone()).increment(1);
        counter!("squall_records_shipped_total", "job" => self.job).increment(self.records);
    }
}

/// Event emitted when a window failed and was abandoned.
pub struct WindowAbandoned {
    /// Job identity for multi-instance deployments.
    pub job: String,
}

impl InternalEvent for WindowAbandoned {
    fn emit(self) {
        trace!(job = %self.job, "Window abandoned");
        counter!("squall_windows_abandoned_total", "job" => self.job).increment(1);
    }
}

/// Event emitted when the checkpoint was saved.
pub struct CheckpointSaved {
    /// Job identity for multi-instance deployments.
    pub job: String,
    /// The persisted window start.
    pub last_start: i64,
}

impl InternalEvent for CheckpointSaved {
    fn emit(self) {
        trace!(job = %self.job, last_start = self.last_start, "Checkpoint saved");
        counter!("squall_checkpoints_saved_total", "job" => self.job.clone()).increment(1);
        gauge!("squall_checkpoint_last_start", "job" => self.job).set(self.last_start as f64);
    }
}

/// Event emitted as records are fetched from the source.
pub struct RecordsFetched {
    /// Job identity for multi-instance deployments.
    pub job: String,
    /// Records fetched in this page.
    pub count: u64,
}

impl InternalEvent for RecordsFetched {
    fn emit(self) {
        trace!(job = %self.job, count = self.count, "Records fetched");
        counter!("squall_records_fetched_total", "job" => self.job).increment(self.count);
    }
}
