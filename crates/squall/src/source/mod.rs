//! The remote log source: record types and the paging capability.
//!
//! The extraction loop only requires the [`LogSource`] shape; the
//! production implementation in [`http`] speaks the remote service's
//! paginated log-read endpoint.

pub mod http;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::FetchError;

pub use http::HttpLogSource;

/// Source log-level codes mapped to a closed set of names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Unknown,
}

impl LogLevel {
    /// Map a source numeric level code.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warning,
            3 => LogLevel::Error,
            4 => LogLevel::Critical,
            _ => LogLevel::Unknown,
        }
    }

    /// Resolve a configured level name; unknown names fall back to Info.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            "critical" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }

    /// The source's numeric code for this level.
    pub fn code(&self) -> i64 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warning => 2,
            LogLevel::Error => 3,
            LogLevel::Critical => 4,
            LogLevel::Unknown => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Unknown => "UNKNOWN",
        }
    }
}

/// One structured application log line attached to a request log.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppLogLine {
    /// Epoch seconds the line was written.
    pub time: f64,
    /// Source numeric level code.
    pub level: i64,
    /// The log message.
    pub message: String,
}

/// One source request-log event, immutable once fetched.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LogRecord {
    /// Epoch seconds; authoritative event time.
    pub end_time: f64,
    /// Response status code.
    pub status: u16,
    /// Request latency in milliseconds.
    pub latency_ms: f64,
    /// Human-readable summary line.
    pub combined: String,
    /// Application log lines, chronological.
    #[serde(default)]
    pub app_logs: Vec<AppLogLine>,
    /// Pagination cursor positioned after this record.
    #[serde(default)]
    pub offset: Option<String>,
}

/// Parameters for one page fetch over `[start, end)`.
#[derive(Debug, Clone)]
pub struct FetchQuery {
    pub start: i64,
    pub end: i64,
    pub min_level: LogLevel,
    pub versions: Vec<String>,
    pub include_app_logs: bool,
    pub include_incomplete: bool,
}

/// One page of records plus the cursor for the next page.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchPage {
    pub records: Vec<LogRecord>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// The source paging capability.
#[async_trait]
pub trait LogSource: Send {
    /// Fetch one page of records whose event time falls in the query's
    /// `[start, end)` interval.
    async fn fetch_page(
        &mut self,
        query: &FetchQuery,
        cursor: Option<&str>,
    ) -> Result<FetchPage, FetchError>;

    /// Re-establish the source session after a credential expiry.
    async fn refresh_session(&mut self) -> Result<(), FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_codes_round_trip() {
        for level in [
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Critical,
        ] {
            assert_eq!(LogLevel::from_code(level.code()), level);
        }
    }

    #[test]
    fn unknown_codes_map_to_unknown() {
        assert_eq!(LogLevel::from_code(5), LogLevel::Unknown);
        assert_eq!(LogLevel::from_code(-3), LogLevel::Unknown);
    }

    #[test]
    fn unknown_level_names_fall_back_to_info() {
        assert_eq!(LogLevel::from_name("verbose"), LogLevel::Info);
        assert_eq!(LogLevel::from_name("WARNING"), LogLevel::Warning);
    }

    #[test]
    fn record_deserializes_without_app_logs() {
        let json = r#"{
            "end_time": 1393696805.25,
            "status": 200,
            "latency_ms": 14.2,
            "combined": "GET / 200"
        }"#;
        let record: LogRecord = serde_json::from_str(json).unwrap();
        assert!(record.app_logs.is_empty());
        assert!(record.offset.is_none());
    }
}
