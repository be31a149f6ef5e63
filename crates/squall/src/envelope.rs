//! Enrichment of raw source records into queue-ready envelopes.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{Map, json};

use squall_common::Envelope;

use crate::source::{LogLevel, LogRecord};

/// Static context applied to every envelope built for one job.
#[derive(Debug, Clone)]
pub struct EnvelopeContext {
    /// Record type tag, e.g. "myapp-production".
    pub record_type: String,
    /// Tags carried on every wire record.
    pub tags: Vec<String>,
    /// Environment name carried in envelope fields.
    pub environment: String,
    /// The source's configured timezone.
    ///
    /// Event times convert through this fixed zone so ordering and
    /// day-bucketing are deterministic regardless of where the process
    /// runs.
    pub tz: Tz,
}

/// Build the envelope for one source record.
///
/// The combined message gets each structured app-log line appended as
/// `"<iso-ts> <LEVEL> <message>"`, blank-line separated from the summary
/// and preserving chronological order.
pub fn build_envelope(record: &LogRecord, ctx: &EnvelopeContext) -> Envelope {
    let timestamp = iso_in_tz(record.end_time, ctx.tz);
    let date = day_in_tz(record.end_time, ctx.tz);

    let mut fields = Map::new();
    fields.insert("response".to_string(), json!(record.status));
    fields.insert("latency_ms".to_string(), json!(record.latency_ms));
    fields.insert("timestamp".to_string(), json!(timestamp));
    fields.insert("environment".to_string(), json!(ctx.environment));
    fields.insert("date".to_string(), json!(date));

    let mut line = record.combined.clone();
    if !record.app_logs.is_empty() {
        let app_lines: Vec<String> = record
            .app_logs
            .iter()
            .map(|app_log| {
                format!(
                    "{} {} {}",
                    iso_in_tz(app_log.time, ctx.tz),
                    LogLevel::from_code(app_log.level).as_str(),
                    app_log.message
                )
            })
            .collect();

        // The blank line keeps the app logs readable in the search UI.
        line.push_str("\n\n");
        line.push_str(&app_lines.join("\n"));
    }

    Envelope {
        record_type: ctx.record_type.clone(),
        tags: ctx.tags.clone(),
        fields,
        timestamp: Some(timestamp),
        line,
    }
}

fn iso_in_tz(epoch: f64, tz: Tz) -> String {
    in_tz(epoch, tz).to_rfc3339()
}

fn day_in_tz(epoch: f64, tz: Tz) -> String {
    in_tz(epoch, tz).format("%Y-%m-%d").to_string()
}

fn in_tz(epoch: f64, tz: Tz) -> DateTime<Tz> {
    let secs = epoch.floor() as i64;
    let nanos = ((epoch - epoch.floor()) * 1e9) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .with_timezone(&tz)
}
