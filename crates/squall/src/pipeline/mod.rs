//! The extraction loop.
//!
//! For each window produced by the walker: page the source, enrich the
//! records into envelopes, hand the batch to the configured sink, and
//! persist the checkpoint. One bad window is logged and abandoned; it
//! must not stop the tail.

use chrono_tz::Tz;
use snafu::ResultExt;
use tracing::{debug, error, info, warn};

use squall_common::{Envelope, emit};

use crate::checkpoint::CheckpointStore;
use crate::envelope::{EnvelopeContext, build_envelope};
use crate::error::{DeliverSnafu, FetchError, FetchSnafu, WindowError};
use crate::metrics::{CheckpointSaved, RecordsFetched, WindowAbandoned, WindowProcessed};
use crate::sink::WindowSink;
use crate::source::{FetchQuery, LogLevel, LogSource};
use crate::window::{TimeWindow, WindowWalker};

/// Counters for one extraction run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Windows whose batch was delivered (including empty windows).
    pub windows_processed: u64,
    /// Windows abandoned after a logged failure.
    pub windows_abandoned: u64,
    /// Records shipped to the sink.
    pub records_shipped: u64,
}

/// Static parameters of one extraction job.
#[derive(Debug, Clone)]
pub struct JobParams {
    /// Job identity; namespaces the checkpoint and metric labels.
    pub job: String,
    /// Application whose logs are fetched.
    pub app_name: String,
    /// Minimum log level to fetch.
    pub min_level: LogLevel,
    /// Application versions to fetch logs for.
    pub versions: Vec<String>,
    /// The source's configured timezone.
    pub tz: Tz,
}

/// The extraction loop: walker, source, sink and checkpoint wired together.
pub struct Extractor<S: LogSource, K: WindowSink> {
    params: JobParams,
    ctx: EnvelopeContext,
    source: S,
    sink: K,
    walker: WindowWalker,
    checkpoint: CheckpointStore,
    fetched_total: u64,
}

impl<S: LogSource, K: WindowSink> Extractor<S, K> {
    pub fn new(
        params: JobParams,
        ctx: EnvelopeContext,
        source: S,
        sink: K,
        walker: WindowWalker,
        checkpoint: CheckpointStore,
    ) -> Self {
        Self {
            params,
            ctx,
            source,
            sink,
            walker,
            checkpoint,
            fetched_total: 0,
        }
    }

    /// Run until the walker terminates (end bound reached or shutdown).
    ///
    /// The checkpoint is persisted to each window's start after its batch
    /// was handed off - also after a caught, logged failure, so resumption
    /// never re-walks windows that were already attempted.
    pub async fn run(mut self) -> ExtractionStats {
        let mut stats = ExtractionStats::default();

        while let Some(window) = self.walker.next_window().await {
            match self.process_window(&window).await {
                Ok(count) => {
                    stats.windows_processed += 1;
                    stats.records_shipped += count;
                    emit!(WindowProcessed {
                        job: self.params.job.clone(),
                        records: count,
                    });
                }
                Err(e) => {
                    // Abandon and continue; no hidden retries.
                    error!(
                        start = window.start,
                        end = window.end,
                        error = %e,
                        "Window failed, abandoning"
                    );
                    stats.windows_abandoned += 1;
                    emit!(WindowAbandoned {
                        job: self.params.job.clone(),
                    });
                }
            }

            match self.checkpoint.save(window.start).await {
                Ok(()) => {
                    if self.checkpoint.is_enabled() {
                        emit!(CheckpointSaved {
                            job: self.params.job.clone(),
                            last_start: window.start,
                        });
                    }
                }
                Err(e) => {
                    // Resumption degrades to an earlier point, never forward.
                    warn!(
                        start = window.start,
                        error = %e,
                        "Checkpoint write failed, continuing"
                    );
                }
            }
        }

        info!(
            windows = stats.windows_processed,
            abandoned = stats.windows_abandoned,
            records = stats.records_shipped,
            "Extraction complete"
        );
        stats
    }

    /// Process one window: page, enrich, deliver.
    async fn process_window(&mut self, window: &TimeWindow) -> Result<u64, WindowError> {
        let query = FetchQuery {
            start: window.start,
            end: window.end,
            min_level: self.params.min_level,
            versions: self.params.versions.clone(),
            include_app_logs: true,
            include_incomplete: true,
        };

        debug!(start = window.start, end = window.end, "Processing window");

        let mut batch: Vec<Envelope> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.fetch_with_reauth(&query, cursor.as_deref()).await?;

            emit!(RecordsFetched {
                job: self.params.job.clone(),
                count: page.records.len() as u64,
            });

            for record in &page.records {
                self.fetched_total += 1;
                if self.fetched_total % 100 == 0 {
                    info!(fetched = self.fetched_total, "Fetch progress");
                }
                batch.push(build_envelope(record, &self.ctx));
            }

            match page.next_cursor {
                Some(next) if !page.records.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        if batch.is_empty() {
            debug!(start = window.start, end = window.end, "Window empty");
            return Ok(0);
        }

        let destination = window.destination(&self.params.app_name, self.params.tz);
        let index_date = window.index_date(self.params.tz);

        info!(
            start = window.start,
            end = window.end,
            destination = %destination,
            records = batch.len(),
            "Delivering window batch"
        );

        self.sink
            .deliver(window, &destination, &index_date, &batch)
            .await
            .context(DeliverSnafu)?;

        Ok(batch.len() as u64)
    }

    /// Fetch one page, re-establishing the session once on expiry.
    ///
    /// Token expiry is expected and triggers a single retry of session
    /// setup, not a crash.
    async fn fetch_with_reauth(
        &mut self,
        query: &FetchQuery,
        cursor: Option<&str>,
    ) -> Result<crate::source::FetchPage, WindowError> {
        match self.source.fetch_page(query, cursor).await {
            Ok(page) => Ok(page),
            Err(FetchError::AuthExpired) => {
                warn!("Session credential rejected, probably expired. Will retry");
                self.source.refresh_session().await.context(FetchSnafu)?;
                self.source
                    .fetch_page(query, cursor)
                    .await
                    .context(FetchSnafu)
            }
            Err(e) => Err(e).context(FetchSnafu),
        }
    }
}
