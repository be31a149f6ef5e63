//! Bulk client for the search index store.
//!
//! Submits batches of index actions over the store's `_bulk` NDJSON API.
//! Node selection follows the transport's philosophy: one node picked
//! uniformly at random per call from the configured set.

use rand::Rng;
use serde::Deserialize;
use serde_json::{Value, json};
use snafu::prelude::*;
use std::time::Duration;
use tracing::{debug, info};

use crate::emit;
use crate::error::{
    BulkRequestSnafu, BulkResponseSnafu, ClientBuildSnafu, IndexError,
};
use crate::metrics::events::BulkChunkFlushed;

/// Index name prefix; the full name is `logstash-YYYY.MM.DD`.
pub const INDEX_PREFIX: &str = "logstash-";

/// Actions per sub-batch. Bounds peak payload size and memory, not
/// logical atomicity.
const BULK_CHUNK_SIZE: usize = 100;

/// Request timeout for bulk submissions.
const BULK_TIMEOUT: Duration = Duration::from_secs(90);

/// One document submission unit for the index store's batch-write API.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkAction {
    /// Target index, e.g. "logstash-2014.03.01".
    pub index: String,
    /// Document type, taken from the formatted record's `@type`.
    pub doc_type: String,
    /// The formatted record itself.
    pub source: Value,
}

impl BulkAction {
    /// Build an action from an already-parsed wire object.
    ///
    /// The type tag is taken from the object's `@type`, defaulting when
    /// absent or empty.
    pub fn from_value(index_date: &str, value: Value) -> Self {
        let doc_type = value
            .get("@type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or("log")
            .to_string();

        Self {
            index: format!("{INDEX_PREFIX}{index_date}"),
            doc_type,
            source: value,
        }
    }

    /// Build an action from a formatted wire string.
    ///
    /// A payload that is not a JSON object (e.g. the `string` format) is
    /// wrapped as a message field with a default type.
    pub fn from_formatted(index_date: &str, formatted: &str) -> Self {
        match serde_json::from_str::<Value>(formatted) {
            Ok(value) if value.is_object() => Self::from_value(index_date, value),
            _ => Self {
                index: format!("{INDEX_PREFIX}{index_date}"),
                doc_type: "log".to_string(),
                source: json!({ "@message": formatted }),
            },
        }
    }

    fn action_line(&self) -> String {
        json!({
            "index": {
                "_index": self.index,
                "_type": self.doc_type,
            }
        })
        .to_string()
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// Client for the index store's bulk API.
pub struct IndexClient {
    nodes: Vec<String>,
    http: reqwest::Client,
}

impl IndexClient {
    /// Create a client over the given node URLs.
    pub fn new(nodes: Vec<String>) -> Result<Self, IndexError> {
        if nodes.is_empty() {
            return Err(IndexError::NoNodes);
        }
        let http = reqwest::Client::builder()
            .timeout(BULK_TIMEOUT)
            .build()
            .context(ClientBuildSnafu)?;
        Ok(Self { nodes, http })
    }

    /// Submit the given actions in bounded sub-batches.
    ///
    /// Returns the number of actions flushed. A failing sub-batch stops
    /// the submission and is reported with the flushed count so callers
    /// can decide between retrying and accepting loss; it is never
    /// silently dropped.
    pub async fn bulk(&self, actions: Vec<BulkAction>) -> Result<usize, IndexError> {
        let total = actions.len();
        let mut flushed = 0;

        for chunk in actions.chunks(BULK_CHUNK_SIZE) {
            self.flush_chunk(chunk, total, flushed).await?;
            flushed += chunk.len();

            emit!(BulkChunkFlushed {
                index: chunk[0].index.clone(),
                count: chunk.len() as u64,
            });
        }

        if total > 0 {
            info!(
                index = %actions[0].index,
                actions = total,
                "Bulk load complete"
            );
        }
        Ok(flushed)
    }

    async fn flush_chunk(
        &self,
        chunk: &[BulkAction],
        total: usize,
        flushed: usize,
    ) -> Result<(), IndexError> {
        let mut body = String::new();
        for action in chunk {
            body.push_str(&action.action_line());
            body.push('\n');
            body.push_str(&action.source.to_string());
            body.push('\n');
        }

        let node = &self.nodes[rand::rng().random_range(0..self.nodes.len())];
        debug!(node = %node, actions = chunk.len(), "Submitting bulk chunk");

        let response = self
            .http
            .post(format!("{}/_bulk", node.trim_end_matches('/')))
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .context(BulkRequestSnafu { node: node.clone() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::BulkRejected {
                node: node.clone(),
                status: status.as_u16(),
            });
        }

        let parsed: BulkResponse = response
            .json()
            .await
            .context(BulkResponseSnafu { node: node.clone() })?;

        if parsed.errors {
            let failed = parsed
                .items
                .iter()
                .filter(|item| {
                    item.as_object()
                        .and_then(|ops| ops.values().next())
                        .map(|op| op.get("error").is_some())
                        .unwrap_or(false)
                })
                .count();
            return Err(IndexError::PartialFailure {
                failed,
                total,
                flushed,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_node_set_is_rejected() {
        assert!(matches!(
            IndexClient::new(vec![]).err(),
            Some(IndexError::NoNodes)
        ));
    }

    #[test]
    fn action_derives_index_and_type() {
        let formatted = r#"{"@type": "myapp-test", "@message": "GET / 200"}"#;
        let action = BulkAction::from_formatted("2014.03.01", formatted);

        assert_eq!(action.index, "logstash-2014.03.01");
        assert_eq!(action.doc_type, "myapp-test");
        assert_eq!(action.source["@message"], json!("GET / 200"));
    }

    #[test]
    fn distinct_types_yield_distinct_actions() {
        let records = [
            r#"{"@type": "frontend", "@message": "a"}"#,
            r#"{"@type": "backend", "@message": "b"}"#,
            r#"{"@type": "worker", "@message": "c"}"#,
        ];
        let actions: Vec<BulkAction> = records
            .iter()
            .map(|r| BulkAction::from_formatted("2014.03.01", r))
            .collect();

        assert_eq!(actions.len(), 3);
        for (action, expected) in actions.iter().zip(["frontend", "backend", "worker"]) {
            assert_eq!(action.index, "logstash-2014.03.01");
            assert_eq!(action.doc_type, expected);
        }
    }

    #[test]
    fn non_json_payload_wraps_as_message() {
        let action = BulkAction::from_formatted("2014.03.01", "[host] [ts] plain line");
        assert_eq!(action.doc_type, "log");
        assert_eq!(action.source["@message"], json!("[host] [ts] plain line"));
    }

    #[test]
    fn action_line_shape() {
        let action = BulkAction::from_formatted("2014.03.01", r#"{"@type": "t"}"#);
        let line: Value = serde_json::from_str(&action.action_line()).unwrap();
        assert_eq!(line["index"]["_index"], json!("logstash-2014.03.01"));
        assert_eq!(line["index"]["_type"], json!("t"));
    }
}
