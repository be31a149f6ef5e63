//! Window batch sinks.
//!
//! The extraction loop hands each window's batch to a [`WindowSink`]; the
//! production implementation dispatches to the replicated transport, the
//! bulk index path, local day-named files, or the datagram side channel
//! per the configured mode.

use async_trait::async_trait;
use snafu::ResultExt;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use squall_common::record::fallback_timestamp;
use squall_common::{Envelope, Format, ReplicatedTransport, WriteOptions};

use crate::config::SinkMode;
use crate::error::{BulkIndexSnafu, FileWriteSnafu, QueueWriteSnafu, SinkError};
use crate::window::TimeWindow;

/// Destination for one window's batch.
#[async_trait]
pub trait WindowSink: Send {
    /// Deliver the whole window batch.
    ///
    /// Failure abandons the window; the caller logs and continues.
    async fn deliver(
        &mut self,
        window: &TimeWindow,
        destination: &str,
        index_date: &str,
        records: &[Envelope],
    ) -> Result<(), SinkError>;
}

/// Appends formatted records to a local file named by calendar day.
pub struct LocalFileSink {
    dir: PathBuf,
    format: Format,
    hostname: String,
}

impl LocalFileSink {
    pub fn new(dir: PathBuf, format: Format, hostname: String) -> Self {
        Self {
            dir,
            format,
            hostname,
        }
    }

    async fn append(
        &self,
        destination: &str,
        records: &[Envelope],
    ) -> Result<(), std::io::Error> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(destination);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let mut buffer = String::new();
        for record in records {
            let timestamp = record
                .timestamp
                .clone()
                .unwrap_or_else(fallback_timestamp);
            let wire = record.to_wire(&self.hostname, destination, &timestamp);
            buffer.push_str(&self.format.format(&wire));
            buffer.push('\n');
        }

        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %path.display(), records = records.len(), "Appended to day file");
        Ok(())
    }
}

/// Production sink: dispatches per the configured mode, optionally
/// mirroring every batch to local day files.
pub struct TransportSink {
    transport: ReplicatedTransport,
    mode: SinkMode,
    file: Option<LocalFileSink>,
    shutdown: CancellationToken,
}

impl TransportSink {
    pub fn new(
        transport: ReplicatedTransport,
        mode: SinkMode,
        file: Option<LocalFileSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            mode,
            file,
            shutdown,
        }
    }
}

#[async_trait]
impl WindowSink for TransportSink {
    async fn deliver(
        &mut self,
        window: &TimeWindow,
        destination: &str,
        index_date: &str,
        records: &[Envelope],
    ) -> Result<(), SinkError> {
        match self.mode {
            SinkMode::Queue => {
                if let Err(e) = self
                    .transport
                    .write(destination, records, WriteOptions::default())
                    .await
                {
                    // Repair the connection for the next window; the
                    // failed window itself is abandoned by the caller.
                    warn!(error = %e, "Queue write failed, reconnecting invalid backends");
                    self.transport.reconnect_invalid(&self.shutdown).await;
                    return Err(e).context(QueueWriteSnafu);
                }
            }
            SinkMode::BulkIndex => {
                let flushed = self
                    .transport
                    .bulk_index(index_date, destination, records, WriteOptions::default())
                    .await
                    .context(BulkIndexSnafu)?;
                info!(
                    start = window.start,
                    end = window.end,
                    flushed,
                    "Window bulk-indexed"
                );
            }
            SinkMode::SideChannel => {
                for record in records {
                    self.transport.side_channel_send(destination, record).await;
                }
            }
            SinkMode::File => {
                // Handled by the mirror below; nothing else to do.
            }
        }

        if let Some(file) = &self.file {
            file.append(destination, records)
                .await
                .context(FileWriteSnafu)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use tempfile::TempDir;

    fn envelope(line: &str) -> Envelope {
        let mut fields = Map::new();
        fields.insert("response".to_string(), json!(200));
        Envelope {
            record_type: "myapp-production".to_string(),
            tags: vec!["gae".to_string()],
            fields,
            timestamp: Some("2014-03-01T10:00:00-08:00".to_string()),
            line: line.to_string(),
        }
    }

    #[tokio::test]
    async fn file_sink_appends_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let sink = LocalFileSink::new(
            dir.path().to_path_buf(),
            Format::Raw,
            "worker1".to_string(),
        );

        sink.append("myapp-2014-03-01.log", &[envelope("a"), envelope("b")])
            .await
            .unwrap();
        sink.append("myapp-2014-03-01.log", &[envelope("c")])
            .await
            .unwrap();

        let contents =
            std::fs::read_to_string(dir.path().join("myapp-2014-03-01.log")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["@message"], json!("a"));
        assert_eq!(first["@source_path"], json!("myapp-2014-03-01.log"));
    }
}
