//! Internal events for transport-level metrics emission.
//!
//! Each event struct represents a measurable occurrence on the replicated
//! transport or the bulk index client. Events implement the
//! [`InternalEvent`] trait which emits the corresponding Prometheus metric.
//!
//! ## Backend Labels
//!
//! Transport metrics include a `backend` label so per-instance failure
//! rates stay visible when fanning out across several queue backends.

use metrics::counter;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
///
/// Implemented by event types in this crate and by the squall/pelican
/// crates for their own pipeline events.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Queue transport events
// ============================================================================

/// Event emitted when a batch of formatted records is flushed to a backend.
pub struct RecordsQueued {
    /// Backend URL the batch landed on.
    pub backend: String,
    /// Number of records in the batch.
    pub count: u64,
}

impl InternalEvent for RecordsQueued {
    fn emit(self) {
        trace!(backend = %self.backend, count = self.count, "Records queued");
        counter!("squall_records_queued_total", "backend" => self.backend).increment(self.count);
    }
}

/// Event emitted when a transport call fails.
pub struct TransportFailed {
    /// Backend URL the call was routed to.
    pub backend: String,
}

impl InternalEvent for TransportFailed {
    fn emit(self) {
        trace!(backend = %self.backend, "Transport call failed");
        counter!("squall_transport_failures_total", "backend" => self.backend).increment(1);
    }
}

/// Event emitted when a side-channel datagram is dropped.
pub struct SideChannelDropped;

impl InternalEvent for SideChannelDropped {
    fn emit(self) {
        trace!("Side channel datagram dropped");
        counter!("squall_side_channel_dropped_total").increment(1);
    }
}

// ============================================================================
// Bulk index events
// ============================================================================

/// Event emitted when a bulk sub-batch is flushed to the index store.
pub struct BulkChunkFlushed {
    /// Index the chunk was written to.
    pub index: String,
    /// Number of actions in the chunk.
    pub count: u64,
}

impl InternalEvent for BulkChunkFlushed {
    fn emit(self) {
        trace!(index = %self.index, count = self.count, "Bulk chunk flushed");
        counter!("squall_bulk_actions_total", "index" => self.index).increment(self.count);
    }
}
