//! Replicated queue transport.
//!
//! Fans writes out across N independent queue backend instances, selecting
//! one uniformly at random per call. Each backend connection retries
//! establishment with incremental backoff and fails fast once exhausted;
//! callers treat a failed call as retryable against a different call.

mod queue;
mod selector;
mod side_channel;

pub use queue::QueueConnection;
pub use selector::{BackendSelector, RandomSelector};
pub use side_channel::SideChannel;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::emit;
use crate::error::{IndexError, TransportError};
use crate::format::Format;
use crate::index::{BulkAction, IndexClient};
use crate::metrics::events::{RecordsQueued, TransportFailed};
use crate::record::{Envelope, fallback_timestamp};
use crate::retry::RetryPolicy;

/// Per-call write options.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Wire-format override; `None` uses the transport's default.
    pub format: Option<Format>,
}

impl WriteOptions {
    /// Use a specific wire format for this call.
    pub fn with_format(format: Format) -> Self {
        Self {
            format: Some(format),
        }
    }
}

/// The replicated transport: N queue connections, an optional bulk index
/// client, and an optional datagram side channel.
pub struct ReplicatedTransport {
    backends: Vec<QueueConnection>,
    selector: Box<dyn BackendSelector>,
    default_format: Format,
    hostname: String,
    index: Option<IndexClient>,
    side_channel: Option<SideChannel>,
}

impl std::fmt::Debug for ReplicatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedTransport")
            .field("backends", &self.backends.len())
            .field("default_format", &self.default_format)
            .field("hostname", &self.hostname)
            .field("index", &self.index.is_some())
            .field("side_channel", &self.side_channel.is_some())
            .finish()
    }
}

impl ReplicatedTransport {
    /// Connect to every configured backend.
    ///
    /// Connections that exhaust their retries stay in the set as invalid;
    /// they participate in selection and fail fast on use.
    pub async fn connect(
        config: &QueueConfig,
        hostname: String,
        shutdown: &CancellationToken,
    ) -> Result<Self, TransportError> {
        if config.urls.is_empty() {
            return Err(TransportError::NoBackends);
        }

        let policy = RetryPolicy::connection();
        let mut backends = Vec::with_capacity(config.urls.len());
        for url in &config.urls {
            let mut conn = QueueConnection::new(url, &config.namespace)?;
            conn.connect(&policy, shutdown).await;
            backends.push(conn);
        }

        let valid = backends.iter().filter(|c| c.is_valid()).count();
        info!(
            backends = backends.len(),
            valid,
            "Replicated transport ready"
        );

        Ok(Self {
            backends,
            selector: Box::new(RandomSelector),
            default_format: Format::from_name(&config.format, Format::Raw),
            hostname,
            index: None,
            side_channel: None,
        })
    }

    /// Build a transport from already-constructed connections.
    ///
    /// Used by tests and by callers that manage connection setup themselves.
    pub fn from_backends(
        backends: Vec<QueueConnection>,
        default_format: Format,
        hostname: String,
    ) -> Result<Self, TransportError> {
        if backends.is_empty() {
            return Err(TransportError::NoBackends);
        }
        Ok(Self {
            backends,
            selector: Box::new(RandomSelector),
            default_format,
            hostname,
            index: None,
            side_channel: None,
        })
    }

    /// Attach a bulk index client for the `bulk_index` path.
    pub fn with_index_client(mut self, client: IndexClient) -> Self {
        self.index = Some(client);
        self
    }

    /// Attach a datagram side channel.
    pub fn with_side_channel(mut self, channel: SideChannel) -> Self {
        self.side_channel = Some(channel);
        self
    }

    /// Replace the backend selector.
    pub fn with_selector(mut self, selector: Box<dyn BackendSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// The configured backend connections.
    pub fn backends(&self) -> &[QueueConnection] {
        &self.backends
    }

    /// Format each record and push the whole batch onto one randomly
    /// selected backend as a single atomic flush.
    ///
    /// A failure means nothing can be assumed about partial delivery.
    pub async fn write(
        &mut self,
        destination: &str,
        records: &[Envelope],
        options: WriteOptions,
    ) -> Result<(), TransportError> {
        let format = options.format.unwrap_or(self.default_format);
        let lines: Vec<String> = records
            .iter()
            .map(|record| format.format(&self.wire_object(destination, record)))
            .collect();

        let idx = self.selector.select(self.backends.len());
        let backend = &mut self.backends[idx];
        let url = backend.url().to_string();

        match backend.push_batch(&lines).await {
            Ok(()) => {
                emit!(RecordsQueued {
                    backend: url,
                    count: lines.len() as u64,
                });
                Ok(())
            }
            Err(e) => {
                emit!(TransportFailed { backend: url });
                Err(e)
            }
        }
    }

    /// Format each record and submit the batch to the index store as bulk
    /// actions, index name derived from the given calendar date.
    ///
    /// Returns the number of actions flushed. Chunking bounds peak payload
    /// size, not logical atomicity; a partial failure mid-bulk is reported,
    /// not silently dropped.
    pub async fn bulk_index(
        &self,
        index_date: &str,
        destination: &str,
        records: &[Envelope],
        options: WriteOptions,
    ) -> Result<usize, IndexError> {
        let client = self.index.as_ref().ok_or(IndexError::NoNodes)?;
        let format = options.format.unwrap_or(self.default_format);

        let actions: Vec<BulkAction> = records
            .iter()
            .map(|record| {
                let formatted = format.format(&self.wire_object(destination, record));
                BulkAction::from_formatted(index_date, &formatted)
            })
            .collect();

        client.bulk(actions).await
    }

    /// Best-effort, fire-and-forget delivery of one record.
    ///
    /// Failures are swallowed; this path must never block the caller.
    pub async fn side_channel_send(&self, destination: &str, record: &Envelope) {
        let Some(channel) = &self.side_channel else {
            debug!("No side channel configured, dropping record");
            return;
        };
        let line = self
            .default_format
            .format(&self.wire_object(destination, record));
        channel.send(&line).await;
    }

    /// Reconnect every invalid backend.
    pub async fn reconnect_invalid(&mut self, shutdown: &CancellationToken) {
        let policy = RetryPolicy::connection();
        for backend in &mut self.backends {
            if !backend.is_valid() {
                backend.reconnect(&policy, shutdown).await;
            }
        }
    }

    fn wire_object(&self, destination: &str, record: &Envelope) -> Map<String, Value> {
        let timestamp = match &record.timestamp {
            Some(ts) => ts.clone(),
            None => {
                warn!(
                    destination = %destination,
                    "Record without timestamp, substituting current UTC time"
                );
                fallback_timestamp()
            }
        };
        record.to_wire(&self.hostname, destination, &timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn envelope(line: &str) -> Envelope {
        let mut fields = Map::new();
        fields.insert("response".to_string(), json!(200));
        Envelope {
            record_type: "myapp-test".to_string(),
            tags: vec!["gae".to_string()],
            fields,
            timestamp: Some("2014-03-01T10:00:00-08:00".to_string()),
            line: line.to_string(),
        }
    }

    fn unconnected_transport(n: usize) -> ReplicatedTransport {
        // Connections are never connected, so every push fails fast with
        // ConnectionInvalid instead of touching the network.
        let backends: Vec<QueueConnection> = (0..n)
            .map(|i| {
                QueueConnection::new(&format!("redis://10.255.0.{}:6379", i + 1), "test_ns")
                    .unwrap()
            })
            .collect();
        ReplicatedTransport::from_backends(backends, Format::Raw, "worker1".to_string()).unwrap()
    }

    #[test]
    fn empty_backend_set_is_rejected() {
        let err = ReplicatedTransport::from_backends(vec![], Format::Raw, "h".to_string())
            .expect_err("no backends");
        assert!(matches!(err, TransportError::NoBackends));
    }

    #[tokio::test]
    async fn write_surfaces_typed_failure_from_invalid_backend() {
        let mut transport = unconnected_transport(1);
        let err = transport
            .write("myapp-2014-03-01.log", &[envelope("GET / 200")], WriteOptions::default())
            .await
            .expect_err("invalid backend must fail");
        assert!(matches!(err, TransportError::ConnectionInvalid { .. }));
    }

    #[tokio::test]
    async fn failed_writes_select_all_backends_roughly_uniformly() {
        let mut transport = unconnected_transport(3);
        let records = [envelope("GET / 200")];

        let mut hits: HashMap<String, usize> = HashMap::new();
        for _ in 0..600 {
            let err = transport
                .write("myapp-2014-03-01.log", &records, WriteOptions::default())
                .await
                .expect_err("all backends invalid");
            if let TransportError::ConnectionInvalid { backend } = err {
                *hits.entry(backend).or_default() += 1;
            }
        }

        assert_eq!(hits.len(), 3, "all three backends should be selected");
        for (backend, count) in &hits {
            assert!(
                *count > 120,
                "backend {backend} selected only {count} of 600 calls"
            );
        }
        // A failing call must not corrupt the other connections' state:
        // the set is intact and still fails fast rather than hanging.
        assert_eq!(transport.backends().len(), 3);
        assert!(transport.backends().iter().all(|b| !b.is_valid()));
    }

    #[tokio::test]
    async fn bulk_index_without_client_reports_no_nodes() {
        let transport = unconnected_transport(1);
        let err = transport
            .bulk_index("2014.03.01", "myapp.log", &[envelope("x")], WriteOptions::default())
            .await
            .expect_err("no index client attached");
        assert!(matches!(err, IndexError::NoNodes));
    }

    #[tokio::test]
    async fn side_channel_send_without_channel_is_a_no_op() {
        let transport = unconnected_transport(1);
        // Must not error or block.
        transport
            .side_channel_send("myapp.log", &envelope("GET / 200"))
            .await;
    }
}
