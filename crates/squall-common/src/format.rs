//! Wire-format strategies for queued records.
//!
//! Formatters are a closed set of pure transforms from an assembled wire
//! object to the string pushed onto the queue. Formatter names from
//! configuration resolve once via [`Format::from_name`]; an unknown name
//! falls back to the configured default, never errors.

use chrono::DateTime;
use serde_json::{Map, Value};
use tracing::warn;

use crate::record::RESERVED_KEYS;

/// A wire-format strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Serialize the full wire object as one JSON object.
    #[default]
    Raw,
    /// Treat `@message` as a JSON object and merge its fields into the
    /// outer object, guaranteeing the reserved keys are present.
    RawJson,
    /// `"[{host}] [{timestamp}] {message}"`.
    String,
    /// Like `rawjson`'s reserved-key guarantee, plus derived date/hour
    /// fields for downstreams that partition by calendar date and hour.
    LogCenter,
    /// Direct serialization of the given mapping, no envelope handling.
    Json,
}

impl Format {
    /// Resolve a formatter name from configuration.
    ///
    /// Unknown names fall back to `default`.
    pub fn from_name(name: &str, default: Format) -> Format {
        match name {
            "raw" => Format::Raw,
            "rawjson" => Format::RawJson,
            "string" => Format::String,
            "logcenter" => Format::LogCenter,
            "json" => Format::Json,
            other => {
                warn!(format = %other, "Unknown formatter name, using default");
                default
            }
        }
    }

    /// Format one wire object. Pure: identical input yields identical output.
    pub fn format(&self, data: &Map<String, Value>) -> String {
        match self {
            Format::Raw | Format::Json => serialize(data),
            Format::RawJson => {
                let mut out = merge_message_fields(data);
                fill_reserved(&mut out);
                serialize(&out)
            }
            Format::String => {
                let host = str_field(data, "@source_host");
                let timestamp = str_field(data, "@timestamp");
                let message = str_field(data, "@message");
                format!("[{host}] [{timestamp}] {message}")
            }
            Format::LogCenter => {
                let mut out = data.clone();
                fill_reserved(&mut out);
                inject_partition_fields(&mut out);
                serialize(&out)
            }
        }
    }
}

fn serialize(data: &Map<String, Value>) -> String {
    serde_json::to_string(data).expect("wire object should always serialize")
}

fn str_field<'a>(data: &'a Map<String, Value>, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Hoist the fields of a JSON-object `@message` to the top level.
///
/// A message that is not a JSON object is left in place with a warning;
/// malformed input must not fail the caller's write.
fn merge_message_fields(data: &Map<String, Value>) -> Map<String, Value> {
    let mut out = data.clone();

    let parsed = out
        .get("@message")
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok());

    match parsed {
        Some(Value::Object(inner)) => {
            out.remove("@message");
            for (key, value) in inner {
                out.insert(key, value);
            }
        }
        _ => {
            warn!("rawjson message payload is not a JSON object, passing through");
        }
    }

    out
}

/// Ensure every reserved key is present, empty string if unused.
fn fill_reserved(data: &mut Map<String, Value>) {
    for key in RESERVED_KEYS {
        data.entry(key.to_string())
            .or_insert_with(|| Value::String(String::new()));
    }
}

/// Inject calendar date, zero-padded hour and fixed component/source tags
/// derived from `@timestamp`, for date/hour-partitioned downstreams.
fn inject_partition_fields(data: &mut Map<String, Value>) {
    let (date, hour) = match data
        .get("@timestamp")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    {
        Some(ts) => (
            ts.format("%Y-%m-%d").to_string(),
            ts.format("%H").to_string(),
        ),
        None => (String::new(), String::new()),
    };

    data.insert("date".to_string(), Value::String(date));
    data.insert("hour".to_string(), Value::String(hour));
    data.insert("component".to_string(), Value::String("squall".to_string()));
    data.insert("source".to_string(), Value::String("applog".to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire_object(message: &str) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("@source".to_string(), json!("file://worker1/app.log"));
        data.insert("@type".to_string(), json!("myapp-test"));
        data.insert("@tags".to_string(), json!(["gae"]));
        data.insert("@fields".to_string(), json!({"response": 200}));
        data.insert(
            "@timestamp".to_string(),
            json!("2014-03-01T10:05:00-08:00"),
        );
        data.insert("@source_host".to_string(), json!("worker1"));
        data.insert("@source_path".to_string(), json!("app.log"));
        data.insert("@message".to_string(), json!(message));
        data
    }

    #[test]
    fn from_name_resolves_known_formats() {
        assert_eq!(Format::from_name("raw", Format::Json), Format::Raw);
        assert_eq!(Format::from_name("rawjson", Format::Raw), Format::RawJson);
        assert_eq!(Format::from_name("string", Format::Raw), Format::String);
        assert_eq!(
            Format::from_name("logcenter", Format::Raw),
            Format::LogCenter
        );
        assert_eq!(Format::from_name("json", Format::Raw), Format::Json);
    }

    #[test]
    fn from_name_falls_back_on_unknown() {
        assert_eq!(Format::from_name("protobuf", Format::Raw), Format::Raw);
        assert_eq!(Format::from_name("", Format::String), Format::String);
    }

    #[test]
    fn raw_serializes_full_object() {
        let data = wire_object("GET / 200");
        let out = Format::Raw.format(&data);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["@message"], json!("GET / 200"));
        assert_eq!(parsed["@type"], json!("myapp-test"));
        assert_eq!(parsed["@fields"]["response"], json!(200));
    }

    #[test]
    fn every_format_is_idempotent() {
        let data = wire_object(r#"{"foo": "bar"}"#);
        for format in [
            Format::Raw,
            Format::RawJson,
            Format::String,
            Format::LogCenter,
            Format::Json,
        ] {
            let first = format.format(&data);
            let second = format.format(&data);
            assert_eq!(first, second, "{format:?} not idempotent");
        }
    }

    #[test]
    fn rawjson_hoists_message_fields_to_top_level() {
        let data = wire_object(r#"{"foo": "bar", "count": 3}"#);
        let out = Format::RawJson.format(&data);
        let parsed: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(parsed["foo"], json!("bar"));
        assert_eq!(parsed["count"], json!(3));
        // The message key is emptied, not nested
        assert_eq!(parsed["@message"], json!(""));
    }

    #[test]
    fn rawjson_fills_reserved_keys() {
        let mut data = Map::new();
        data.insert("@message".to_string(), json!(r#"{"foo": 1}"#));
        let out = Format::RawJson.format(&data);
        let parsed: Value = serde_json::from_str(&out).unwrap();

        for key in RESERVED_KEYS {
            assert!(parsed.get(key).is_some(), "missing {key}");
        }
        assert_eq!(parsed["@source_host"], json!(""));
    }

    #[test]
    fn rawjson_passes_through_non_json_message() {
        let data = wire_object("plain text line");
        let out = Format::RawJson.format(&data);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["@message"], json!("plain text line"));
    }

    #[test]
    fn string_format_layout() {
        let data = wire_object("GET / 200");
        let out = Format::String.format(&data);
        assert_eq!(out, "[worker1] [2014-03-01T10:05:00-08:00] GET / 200");
    }

    #[test]
    fn logcenter_injects_date_and_hour() {
        let data = wire_object("GET / 200");
        let out = Format::LogCenter.format(&data);
        let parsed: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(parsed["date"], json!("2014-03-01"));
        assert_eq!(parsed["hour"], json!("10"));
        assert_eq!(parsed["component"], json!("squall"));
        assert_eq!(parsed["source"], json!("applog"));
        // Original keys survive
        assert_eq!(parsed["@message"], json!("GET / 200"));
    }

    #[test]
    fn logcenter_tolerates_unparseable_timestamp() {
        let mut data = wire_object("GET / 200");
        data.insert("@timestamp".to_string(), json!("not-a-time"));
        let out = Format::LogCenter.format(&data);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["date"], json!(""));
        assert_eq!(parsed["hour"], json!(""));
    }
}
