use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use xcw_engine::Pipeline;
use xcw_output::{Emitter, LogEvent, ReplayComplete};
use xcw_types::LogEntry;

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub file: PathBuf,
    /// Only replay entries younger than this.
    pub since: Option<Duration>,
    pub limit: Option<u64>,
}

/// Feeds a previously captured NDJSON file back through the live filter
/// pipeline and emitter. Lines that are not log events (heartbeats,
/// summaries, prose) are skipped silently.
pub fn replay(
    opts: &ReplayOptions,
    pipeline: &Pipeline,
    emitter: &Emitter,
    tail_id: &str,
) -> Result<u64> {
    let file = std::fs::File::open(&opts.file)
        .with_context(|| format!("opening {}", opts.file.display()))?;
    let reader = BufReader::new(file);

    let cutoff = opts.since.map(|since| Utc::now() - since);
    let mut emitted: u64 = 0;

    for line in reader.lines() {
        let line = line?;
        let Some((entry, session)) = decode_line(&line) else {
            continue;
        };

        if let Some(cutoff) = cutoff {
            if entry.timestamp < cutoff {
                continue;
            }
        }

        if !pipeline.matches(&entry) {
            continue;
        }

        emitter.log(&LogEvent::new(&entry, tail_id, session.max(1)))?;
        emitted += 1;

        if let Some(limit) = opts.limit {
            if emitted >= limit {
                break;
            }
        }
    }

    emitter.replay_complete(&ReplayComplete::new(emitted))?;
    emitter.flush()?;
    Ok(emitted)
}

/// Accepts both enveloped `log` events and bare serialized entries.
pub(crate) fn decode_line(line: &str) -> Option<(LogEntry, u64)> {
    let line = line.trim();
    if line.is_empty() || !line.starts_with('{') {
        return None;
    }

    if let Ok(event) = serde_json::from_str::<LogEvent>(line) {
        if event.event_type == "log" {
            let entry = LogEntry {
                timestamp: event.timestamp,
                level: event.level,
                process: event.process,
                pid: event.pid,
                image_uuid: String::new(),
                subsystem: event.subsystem,
                category: event.category,
                message: event.message,
                raw: None,
            };
            return Some((entry, event.session));
        }
    }

    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    // Anything with an explicit non-log type is some other event.
    if value.get("type").is_some() {
        return None;
    }
    let entry: LogEntry = serde_json::from_value(value).ok()?;
    Some((entry, 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_enveloped_log_events() {
        let line = r#"{"type":"log","schemaVersion":1,"tail_id":"t","session":3,
            "contract_version":1,"timestamp":"2025-12-11T10:00:00Z","level":"Error",
            "process":"App","pid":1,"subsystem":"com.ex","category":"","message":"boom"}"#
            .replace('\n', "");
        let (entry, session) = decode_line(&line).unwrap();
        assert_eq!(entry.message, "boom");
        assert_eq!(session, 3);
    }

    #[test]
    fn decodes_bare_entries() {
        let line = r#"{"timestamp":"2025-12-11T10:00:00Z","level":"Info",
            "process":"App","pid":1,"message":"plain"}"#
            .replace('\n', "");
        let (entry, session) = decode_line(&line).unwrap();
        assert_eq!(entry.message, "plain");
        assert_eq!(session, 1);
    }

    #[test]
    fn skips_other_event_types_and_garbage() {
        assert!(decode_line(r#"{"type":"heartbeat","schemaVersion":1}"#).is_none());
        assert!(decode_line("not json").is_none());
        assert!(decode_line("").is_none());
    }
}
