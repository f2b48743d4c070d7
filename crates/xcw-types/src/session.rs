use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{CONTRACT_VERSION, SCHEMA_VERSION};

/// Emitted when a new app session begins (first log, or relaunch detected
/// via PID / binary image UUID change).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStart {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    /// "APP_RELAUNCHED" when a predecessor session existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,

    pub session: u64,
    pub pid: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_pid: Option<i64>,

    pub app: String,
    pub simulator: String,
    pub udid: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_uuid: String,

    /// RFC3339 wall-clock time of the transition.
    pub timestamp: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tail_id: String,

    pub contract_version: u32,
}

/// Emitted when an app session ends (relaunch, idle timeout, shutdown).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEnd {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    pub session: u64,
    pub pid: i64,

    /// Set to "idle_timeout" when the session was closed by inactivity
    /// rather than a relaunch or shutdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub summary: SessionSummary,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tail_id: String,
}

/// Statistics for a completed session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_logs: u64,
    pub errors: u64,
    pub faults: u64,
    pub duration_seconds: u64,
}

/// Verbose-only transition record describing why a session rolled over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDebug {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tail_id: String,

    pub session: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_session: Option<u64>,

    pub pid: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_pid: Option<i64>,

    /// e.g. "first_log", "relaunch", "image_change", "idle_timeout"
    pub reason: String,
}

impl SessionStart {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: u64,
        pid: i64,
        previous_pid: Option<i64>,
        app: &str,
        simulator: &str,
        udid: &str,
        tail_id: &str,
        image_uuid: &str,
    ) -> Self {
        let alert = previous_pid.map(|_| "APP_RELAUNCHED".to_string());
        SessionStart {
            event_type: "session_start".to_string(),
            schema_version: SCHEMA_VERSION,
            alert,
            session,
            pid,
            previous_pid,
            app: app.to_string(),
            simulator: simulator.to_string(),
            udid: udid.to_string(),
            image_uuid: image_uuid.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            tail_id: tail_id.to_string(),
            contract_version: CONTRACT_VERSION,
        }
    }
}

impl SessionEnd {
    pub fn new(session: u64, pid: i64, summary: SessionSummary, tail_id: &str) -> Self {
        SessionEnd {
            event_type: "session_end".to_string(),
            schema_version: SCHEMA_VERSION,
            session,
            pid,
            reason: None,
            summary,
            tail_id: tail_id.to_string(),
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_start_has_no_alert() {
        let start = SessionStart::new(1, 111, None, "com.ex", "Sim", "UDID", "tail-1", "U1");
        assert_eq!(start.session, 1);
        assert!(start.alert.is_none());
        assert!(start.previous_pid.is_none());

        let json = serde_json::to_string(&start).unwrap();
        assert!(json.contains("\"type\":\"session_start\""));
        assert!(json.contains("\"schemaVersion\":1"));
        assert!(!json.contains("previous_pid"));
        assert!(!json.contains("alert"));
    }

    #[test]
    fn relaunch_start_carries_alert_and_previous_pid() {
        let start = SessionStart::new(2, 222, Some(111), "com.ex", "Sim", "UDID", "tail-1", "U1");
        assert_eq!(start.alert.as_deref(), Some("APP_RELAUNCHED"));
        assert_eq!(start.previous_pid, Some(111));
    }

    #[test]
    fn end_serializes_summary_and_optional_reason() {
        let end = SessionEnd::new(
            3,
            111,
            SessionSummary {
                total_logs: 10,
                errors: 2,
                faults: 0,
                duration_seconds: 42,
            },
            "tail-1",
        );
        let json = serde_json::to_string(&end).unwrap();
        assert!(json.contains("\"total_logs\":10"));
        assert!(!json.contains("reason"));

        let idle = end.with_reason("idle_timeout");
        let json = serde_json::to_string(&idle).unwrap();
        assert!(json.contains("\"reason\":\"idle_timeout\""));
    }
}
