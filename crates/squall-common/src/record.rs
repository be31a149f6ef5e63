//! Envelope and wire record types for the queue protocol.
//!
//! An [`Envelope`] is the enriched, format-ready representation of one log
//! record. The transport assembles it into the wire object (the `@`-keyed
//! JSON mapping consumers pop off the queue) together with the source host
//! and destination path it is writing for.

use chrono::Utc;
use serde_json::{Map, Value};

/// Reserved wire record keys that `rawjson` and `logcenter` formatted output
/// guarantees are present (empty string if unused).
pub const RESERVED_KEYS: [&str; 7] = [
    "@message",
    "@source",
    "@source_host",
    "@source_path",
    "@tags",
    "@timestamp",
    "@type",
];

/// The enriched, format-ready representation of one log record.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Source application/environment tag (e.g. "myapp-production").
    pub record_type: String,
    /// Free-form tags carried on the wire record.
    pub tags: Vec<String>,
    /// Structured fields; at least `response`, `latency_ms`, `timestamp`,
    /// `environment` and `date` for extracted request logs.
    pub fields: Map<String, Value>,
    /// ISO-8601 event time in the source's configured timezone.
    ///
    /// `None` signals a caller bug upstream; the transport substitutes
    /// current UTC time and logs that a fallback was used.
    pub timestamp: Option<String>,
    /// Combined human-readable message, app-log lines appended.
    pub line: String,
}

impl Envelope {
    /// Assemble the wire object for this envelope.
    ///
    /// `host` and `path` identify the producer and the destination the
    /// record was written for; `timestamp` is the already-defaulted event
    /// time (see [`fallback_timestamp`]).
    pub fn to_wire(&self, host: &str, path: &str, timestamp: &str) -> Map<String, Value> {
        let mut wire = Map::new();
        wire.insert(
            "@source".to_string(),
            Value::String(format!("file://{host}/{path}")),
        );
        wire.insert(
            "@type".to_string(),
            Value::String(self.record_type.clone()),
        );
        wire.insert(
            "@tags".to_string(),
            Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
        );
        wire.insert("@fields".to_string(), Value::Object(self.fields.clone()));
        wire.insert(
            "@timestamp".to_string(),
            Value::String(timestamp.to_string()),
        );
        wire.insert("@source_host".to_string(), Value::String(host.to_string()));
        wire.insert("@source_path".to_string(), Value::String(path.to_string()));
        wire.insert("@message".to_string(), Value::String(self.line.clone()));
        wire
    }
}

/// Current UTC time in ISO-8601 with a `Z` suffix, used when an envelope
/// carries no timestamp.
pub fn fallback_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_envelope() -> Envelope {
        let mut fields = Map::new();
        fields.insert("response".to_string(), json!(200));
        fields.insert("latency_ms".to_string(), json!(12.5));
        Envelope {
            record_type: "myapp-test".to_string(),
            tags: vec!["gae".to_string()],
            fields,
            timestamp: Some("2014-03-01T10:00:00-08:00".to_string()),
            line: "GET / 200".to_string(),
        }
    }

    #[test]
    fn wire_object_carries_all_reserved_keys() {
        let envelope = sample_envelope();
        let wire = envelope.to_wire("worker1", "myapp-2014-03-01.log", "2014-03-01T10:00:00-08:00");

        for key in RESERVED_KEYS {
            assert!(wire.contains_key(key), "missing {key}");
        }
        assert_eq!(wire["@type"], json!("myapp-test"));
        assert_eq!(wire["@source_host"], json!("worker1"));
        assert_eq!(wire["@source_path"], json!("myapp-2014-03-01.log"));
        assert_eq!(wire["@source"], json!("file://worker1/myapp-2014-03-01.log"));
        assert_eq!(wire["@message"], json!("GET / 200"));
    }

    #[test]
    fn fallback_timestamp_is_utc_with_z_suffix() {
        let ts = fallback_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }
}
