//! The drain loop.
//!
//! Pops queue entries one at a time, accumulates parsed records, and bulk
//! flushes once a batch fills, deriving the target index from the most
//! recently popped record's date field. Malformed entries are logged and
//! dropped; a failing bulk flush is retried before loss is accepted,
//! never silently skipped.

mod traits;

pub use traits::{BulkSink, QueueSource};

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use squall_common::emit;
use squall_common::index::BulkAction;
use squall_common::retry::RetryPolicy;

use crate::metrics::{BatchIndexed, BulkFlushRetried, MalformedDropped, RecordsLost};

/// Counters for one drain run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    /// Entries popped off the queue.
    pub popped: u64,
    /// Records bulk-loaded into the index store.
    pub indexed: u64,
    /// Malformed entries dropped.
    pub dropped: u64,
    /// Records lost after exhausting bulk retries.
    pub lost: u64,
}

/// The bulk indexing consumer.
pub struct Drain<Q: QueueSource, S: BulkSink> {
    source: Q,
    sink: S,
    batch: Vec<Value>,
    batch_size: usize,
    poll_interval: Duration,
    retry: RetryPolicy,
    shutdown: CancellationToken,
    stats: DrainStats,
}

impl<Q: QueueSource, S: BulkSink> Drain<Q, S> {
    pub fn new(
        source: Q,
        sink: S,
        batch_size: usize,
        poll_interval: Duration,
        retry: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            sink,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            poll_interval,
            retry,
            shutdown,
            stats: DrainStats::default(),
        }
    }

    /// Run until interrupted, flushing any partial batch on the way out.
    pub async fn run(mut self) -> DrainStats {
        info!(
            batch_size = self.batch_size,
            poll_interval_secs = self.poll_interval.as_secs(),
            "Drain loop starting"
        );

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.source.pop().await {
                Ok(Some(raw)) => {
                    self.stats.popped += 1;
                    self.ingest(raw);
                }
                Ok(None) => {
                    debug!("Queue empty, waiting");
                    self.idle().await;
                    continue;
                }
                Err(e) => {
                    // Pop failures are transient; back off and keep draining.
                    warn!(error = %e, "Queue pop failed, waiting");
                    self.idle().await;
                    continue;
                }
            }

            if self.batch.len() >= self.batch_size {
                self.flush().await;
            }
        }

        // Hand off whatever accumulated before the interrupt.
        self.flush().await;

        info!(
            popped = self.stats.popped,
            indexed = self.stats.indexed,
            dropped = self.stats.dropped,
            lost = self.stats.lost,
            "Drain loop complete"
        );
        self.stats
    }

    /// Parse one raw entry into the batch; malformed payloads are logged
    /// and dropped, never crash the loop.
    fn ingest(&mut self, raw: String) {
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) if value.is_object() => self.batch.push(value),
            _ => {
                warn!(
                    entry = %truncate(&raw, 256),
                    "Malformed queue entry, dropping"
                );
                self.stats.dropped += 1;
                emit!(MalformedDropped);
            }
        }
    }

    /// Bulk flush the current batch, retrying per policy before
    /// accepting loss.
    async fn flush(&mut self) {
        let index_date = match self.batch.last() {
            Some(last) => index_date_for(last),
            None => return,
        };
        let actions: Vec<BulkAction> = self
            .batch
            .iter()
            .map(|record| BulkAction::from_value(&index_date, record.clone()))
            .collect();

        let count = actions.len();
        let mut attempt = 0;

        loop {
            match self.sink.bulk(actions.clone()).await {
                Ok(flushed) => {
                    info!(index_date = %index_date, records = flushed, "Batch indexed");
                    self.stats.indexed += flushed as u64;
                    self.batch.clear();
                    emit!(BatchIndexed {
                        index_date: index_date.clone(),
                        count: flushed as u64,
                    });
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    if !self.retry.allows(attempt) || self.shutdown.is_cancelled() {
                        // Loss is accepted only after the retry budget, and
                        // loudly.
                        error!(
                            index_date = %index_date,
                            records = count,
                            attempts = attempt,
                            error = %e,
                            "Bulk flush exhausted retries, dropping batch"
                        );
                        self.stats.lost += count as u64;
                        self.batch.clear();
                        emit!(RecordsLost {
                            count: count as u64,
                        });
                        return;
                    }

                    warn!(
                        index_date = %index_date,
                        attempt,
                        error = %e,
                        "Bulk flush failed, retrying same batch"
                    );
                    emit!(BulkFlushRetried);

                    let delay = self.retry.delay_for(attempt);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Sleep one poll interval, waking early on shutdown. Never busy-spins.
    async fn idle(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.poll_interval) => {}
        }
    }
}

/// Derive the dot-separated index date for a record.
///
/// Prefers the producer-supplied `@fields.date`, falls back to the record
/// timestamp, then to today; a record missing both is still indexed
/// rather than dropped.
fn index_date_for(record: &Value) -> String {
    if let Some(date) = record
        .pointer("/@fields/date")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
    {
        return date.replace('-', ".");
    }

    if let Some(ts) = record
        .get("@timestamp")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    {
        return ts.format("%Y.%m.%d").to_string();
    }

    warn!("Record without date field, bucketing to today");
    Utc::now().format("%Y.%m.%d").to_string()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use squall_common::error::{IndexError, TransportError};
    use squall_common::retry::Backoff;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Pops from a fixed list, then cancels the shutdown token.
    struct FakeQueue {
        items: VecDeque<String>,
        shutdown: CancellationToken,
    }

    #[async_trait]
    impl QueueSource for FakeQueue {
        async fn pop(&mut self) -> Result<Option<String>, TransportError> {
            match self.items.pop_front() {
                Some(item) => Ok(Some(item)),
                None => {
                    self.shutdown.cancel();
                    Ok(None)
                }
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        batches: Arc<Mutex<Vec<Vec<BulkAction>>>>,
        failures_remaining: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl BulkSink for RecordingSink {
        async fn bulk(&self, actions: Vec<BulkAction>) -> Result<usize, IndexError> {
            {
                let mut failures = self.failures_remaining.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(IndexError::NoNodes);
                }
            }
            let count = actions.len();
            self.batches.lock().unwrap().push(actions);
            Ok(count)
        }
    }

    fn wire_entry(i: usize, date: &str) -> String {
        json!({
            "@type": "myapp-production",
            "@tags": ["gae"],
            "@fields": {"response": 200, "date": date},
            "@timestamp": format!("{}T10:00:00-08:00", date),
            "@message": format!("GET /page/{i} 200"),
        })
        .to_string()
    }

    fn no_wait_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Backoff::Fixed {
                delay: Duration::ZERO,
            },
        }
    }

    fn drain_over(
        items: Vec<String>,
        sink: RecordingSink,
        batch_size: usize,
    ) -> Drain<FakeQueue, RecordingSink> {
        let shutdown = CancellationToken::new();
        let queue = FakeQueue {
            items: items.into(),
            shutdown: shutdown.clone(),
        };
        Drain::new(
            queue,
            sink,
            batch_size,
            Duration::from_secs(1),
            no_wait_policy(),
            shutdown,
        )
    }

    #[tokio::test]
    async fn full_batches_flush_with_derived_index() {
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();
        let items: Vec<String> = (0..250).map(|i| wire_entry(i, "2014-03-01")).collect();

        let stats = drain_over(items, sink, 100).run().await;

        assert_eq!(stats.popped, 250);
        assert_eq!(stats.indexed, 250);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.lost, 0);

        let batches = batches.lock().unwrap();
        // Two full batches plus the final partial flush on shutdown.
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 100);
        assert_eq!(batches[2].len(), 50);
        for action in batches.iter().flatten() {
            assert_eq!(action.index, "logstash-2014.03.01");
            assert_eq!(action.doc_type, "myapp-production");
        }
    }

    #[tokio::test]
    async fn malformed_entries_are_dropped_not_fatal() {
        let sink = RecordingSink::default();
        let batches = sink.batches.clone();
        let items = vec![
            wire_entry(0, "2014-03-01"),
            "{not json at all".to_string(),
            "42".to_string(),
            wire_entry(1, "2014-03-01"),
        ];

        let stats = drain_over(items, sink, 100).run().await;

        assert_eq!(stats.popped, 4);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.indexed, 2);
        assert_eq!(batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_flush_retries_same_batch_before_accepting_loss() {
        let sink = RecordingSink::default();
        *sink.failures_remaining.lock().unwrap() = 2;
        let batches = sink.batches.clone();
        let items: Vec<String> = (0..100).map(|i| wire_entry(i, "2014-03-01")).collect();

        let stats = drain_over(items, sink, 100).run().await;

        // Two failures, then the same batch lands intact.
        assert_eq!(stats.indexed, 100);
        assert_eq!(stats.lost, 0);
        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 100);
    }

    #[tokio::test]
    async fn exhausted_retries_accept_loss_loudly() {
        let sink = RecordingSink::default();
        *sink.failures_remaining.lock().unwrap() = 100;
        let items: Vec<String> = (0..10).map(|i| wire_entry(i, "2014-03-01")).collect();

        // batch_size 10 so the flush happens inside the loop and the full
        // retry budget applies.
        let stats = drain_over(items, sink, 10).run().await;

        assert_eq!(stats.indexed, 0);
        assert_eq!(stats.lost, 10);
    }

    #[test]
    fn index_date_prefers_the_fields_date() {
        let record = json!({
            "@fields": {"date": "2014-03-01"},
            "@timestamp": "2014-03-02T10:00:00-08:00",
        });
        assert_eq!(index_date_for(&record), "2014.03.01");
    }

    #[test]
    fn index_date_falls_back_to_the_timestamp() {
        let record = json!({
            "@fields": {},
            "@timestamp": "2014-03-02T10:00:00-08:00",
        });
        assert_eq!(index_date_for(&record), "2014.03.02");
    }
}
