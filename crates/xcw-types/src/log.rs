use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of a unified-logging record, ordered by priority.
///
/// The ordering is the one the platform uses: `Default` sits *above*
/// `Info`, not between `Debug` and `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    Debug,
    Info,
    Default,
    Error,
    Fault,
}

impl LogLevel {
    /// Numeric priority (Debug=0 .. Fault=4), used by level comparisons
    /// in WHERE clauses and summaries.
    pub fn priority(self) -> u8 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Default => 2,
            LogLevel::Error => 3,
            LogLevel::Fault => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "Debug",
            LogLevel::Info => "Info",
            LogLevel::Default => "Default",
            LogLevel::Error => "Error",
            LogLevel::Fault => "Fault",
        }
    }

    /// Single-letter tag for compact text rendering.
    pub fn letter(self) -> char {
        match self {
            LogLevel::Debug => 'D',
            LogLevel::Info => 'I',
            LogLevel::Default => '-',
            LogLevel::Error => 'E',
            LogLevel::Fault => 'F',
        }
    }

    /// Lenient, total parser. Unknown names coerce to `Default` so a
    /// malformed upstream record can never fail level parsing.
    pub fn parse(s: &str) -> LogLevel {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "default" => LogLevel::Default,
            "error" => LogLevel::Error,
            "fault" => LogLevel::Fault,
            _ => LogLevel::Default,
        }
    }
}

impl From<String> for LogLevel {
    fn from(s: String) -> Self {
        LogLevel::parse(&s)
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical structured log record.
///
/// Timestamps are best-effort monotonic within a supervisor session; the
/// platform source may emit out-of-order within milliseconds, so nothing
/// downstream may assume strict ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,

    pub level: LogLevel,

    /// Process image basename, e.g. "MyApp".
    pub process: String,

    pub pid: i64,

    /// Binary image UUID. Stable per running build; changes across
    /// reinstalls even when the PID is reused.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_uuid: String,

    /// Conventionally the bundle identifier.
    #[serde(default)]
    pub subsystem: String,

    #[serde(default)]
    pub category: String,

    pub message: String,

    /// Opaque upstream payload, retained for diagnostics only.
    #[serde(skip)]
    pub raw: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_priority_matches_platform_order() {
        let cases = [
            (LogLevel::Debug, 0),
            (LogLevel::Info, 1),
            (LogLevel::Default, 2),
            (LogLevel::Error, 3),
            (LogLevel::Fault, 4),
        ];
        for (level, priority) in cases {
            assert_eq!(level.priority(), priority);
        }
    }

    #[test]
    fn level_ordering_follows_priority() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Default);
        assert!(LogLevel::Default < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fault);
    }

    #[test]
    fn level_parse_is_lenient_and_total() {
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("Debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("FAULT"), LogLevel::Fault);
        assert_eq!(LogLevel::parse("info"), LogLevel::Info);
        assert_eq!(LogLevel::parse(""), LogLevel::Default);
        assert_eq!(LogLevel::parse("unknown"), LogLevel::Default);
        assert_eq!(LogLevel::parse("WARNING"), LogLevel::Default);
    }

    #[test]
    fn level_serde_round_trip() {
        let json = serde_json::to_string(&LogLevel::Error).unwrap();
        assert_eq!(json, "\"Error\"");
        let back: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, LogLevel::Error);
        let coerced: LogLevel = serde_json::from_str("\"notice\"").unwrap();
        assert_eq!(coerced, LogLevel::Default);
    }

    #[test]
    fn entry_serialization_omits_raw() {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            process: "TestApp".to_string(),
            pid: 12345,
            image_uuid: "ABCD-1234".to_string(),
            subsystem: "com.test.app".to_string(),
            category: "network".to_string(),
            message: "Connection failed".to_string(),
            raw: Some(serde_json::json!({"secret": true})),
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("secret"));

        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.level, LogLevel::Error);
        assert_eq!(back.pid, 12345);
        assert_eq!(back.message, "Connection failed");
        assert!(back.raw.is_none());
    }
}
