use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use xcw_types::{LogEntry, LogLevel};

/// One line of `log stream --style json` output, as the platform emits it.
#[derive(Debug, Deserialize)]
pub struct RawLogRecord {
    #[serde(default)]
    pub timestamp: String,

    #[serde(rename = "eventMessage", default)]
    pub event_message: String,

    #[serde(rename = "messageType", default)]
    pub message_type: String,

    #[serde(rename = "processImagePath", default)]
    pub process_image_path: String,

    #[serde(rename = "processID", default)]
    pub process_id: i64,

    #[serde(rename = "processImageUUID", default)]
    pub process_image_uuid: String,

    #[serde(default)]
    pub subsystem: String,

    #[serde(default)]
    pub category: String,
}

impl RawLogRecord {
    /// Remaps a raw record into the canonical entry. Never fails: an
    /// unparseable timestamp falls back to now, an unknown message type
    /// coerces to Default.
    pub fn into_entry(self, raw: Value) -> LogEntry {
        let timestamp = parse_log_timestamp(&self.timestamp).unwrap_or_else(Utc::now);
        let process = self
            .process_image_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.process_image_path)
            .to_string();

        LogEntry {
            timestamp,
            level: LogLevel::parse(&self.message_type),
            process,
            pid: self.process_id,
            image_uuid: self.process_image_uuid,
            subsystem: self.subsystem,
            category: self.category,
            message: self.event_message,
            raw: Some(raw),
        }
    }
}

/// The platform emits `"2025-12-11 10:00:00.123456+0000"`; replayed or
/// resumed input may carry RFC3339(-nano) instead. Fractional precision
/// varies, so both forms accept any number of sub-second digits.
pub fn parse_log_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    // Zone-less fallback, treated as UTC.
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    None
}

/// Parses one subprocess line into an entry. `None` for ignorable filler
/// (the stream prelude is not JSON); `Some(Err)` for malformed JSON that
/// should surface as a decode notice.
pub fn parse_stream_line(line: &str) -> Option<std::result::Result<LogEntry, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() || !line.starts_with('{') {
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => return Some(Err(err)),
    };

    match RawLogRecord::deserialize(&value) {
        Ok(record) => Some(Ok(record.into_entry(value))),
        Err(err) => Some(Err(err)),
    }
}
