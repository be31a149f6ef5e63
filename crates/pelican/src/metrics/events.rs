//! Internal events for consumer metrics emission.
//!
//! Each event struct represents a measurable occurrence in the drain
//! loop. Events implement the shared `InternalEvent` trait which emits
//! the corresponding Prometheus metric.

use metrics::counter;
use tracing::trace;

use squall_common::metrics::InternalEvent;

/// Event emitted when a batch was bulk-loaded into the index store.
pub struct BatchIndexed {
    /// Dot-separated index date the batch landed in.
    pub index_date: String,
    /// Records in the batch.
    pub count: u64,
}

impl InternalEvent for BatchIndexed {
    fn emit(self) {
        trace!(index_date = %self.index_date, count = self.count, "Batch indexed");
        counter!("pelican_records_indexed_total", "index_date" => self.index_date)
            .increment(self.count);
    }
}

/// Event emitted when a malformed queue entry was dropped.
pub struct MalformedDropped;

impl InternalEvent for MalformedDropped {
    fn emit(self) {
        trace!("Malformed entry dropped");
        counter!("pelican_malformed_dropped_total").increment(1);
    }
}

/// Event emitted when a failed bulk flush is retried.
pub struct BulkFlushRetried;

impl InternalEvent for BulkFlushRetried {
    fn emit(self) {
        trace!("Bulk flush retried");
        counter!("pelican_bulk_retries_total").increment(1);
    }
}

/// Event emitted when a batch was dropped after exhausting retries.
pub struct RecordsLost {
    /// Records in the dropped batch.
    pub count: u64,
}

impl InternalEvent for RecordsLost {
    fn emit(self) {
        trace!(count = self.count, "Records lost");
        counter!("pelican_records_lost_total").increment(self.count);
    }
}
