use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use xcw_types::{LogEntry, LogLevel, CONTRACT_VERSION, SCHEMA_VERSION};

/// First emission of every tail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ready {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub timestamp: String,
    pub simulator: String,
    pub udid: String,
    pub app: String,
    pub tail_id: String,
    pub session: u64,
    pub contract_version: u32,
}

impl Ready {
    pub fn new(simulator: &str, udid: &str, app: &str, tail_id: &str, session: u64) -> Self {
        Ready {
            event_type: "ready".to_string(),
            schema_version: SCHEMA_VERSION,
            timestamp: Utc::now().to_rfc3339(),
            simulator: simulator.to_string(),
            udid: udid.to_string(),
            app: app.to_string(),
            tail_id: tail_id.to_string(),
            session,
            contract_version: CONTRACT_VERSION,
        }
    }
}

/// One log entry on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub tail_id: String,
    pub session: u64,
    pub contract_version: u32,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub process: String,
    pub pid: i64,
    #[serde(default)]
    pub subsystem: String,
    #[serde(default)]
    pub category: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(entry: &LogEntry, tail_id: &str, session: u64) -> Self {
        LogEvent {
            event_type: "log".to_string(),
            schema_version: SCHEMA_VERSION,
            tail_id: tail_id.to_string(),
            session,
            contract_version: CONTRACT_VERSION,
            timestamp: entry.timestamp,
            level: entry.level,
            process: entry.process.clone(),
            pid: entry.pid,
            subsystem: entry.subsystem.clone(),
            category: entry.category.clone(),
            message: entry.message.clone(),
        }
    }
}

/// Idle-period keepalive. Skipped whenever logs flowed during the
/// interval; the summary covers that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub logs_since_last: u64,
    pub tail_id: String,
    pub contract_version: u32,
    pub latest_session: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelCounts {
    pub debug: u64,
    pub info: u64,
    pub default: u64,
    pub error: u64,
    pub fault: u64,
}

impl LevelCounts {
    pub fn record(&mut self, level: LogLevel) {
        match level {
            LogLevel::Debug => self.debug += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Default => self.default += 1,
            LogLevel::Error => self.error += 1,
            LogLevel::Fault => self.fault += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.debug + self.info + self.default + self.error + self.fault
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopMessage {
    pub message: String,
    pub count: u64,
}

/// Periodic aggregate over the last summary interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub tail_id: String,
    pub session: u64,
    pub contract_version: u32,
    pub interval_seconds: u64,
    pub counts: LevelCounts,
    pub errors_per_minute: f64,
    pub top_errors: Vec<TopMessage>,
    pub suppressed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectNotice {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// "reconnecting" or "reconnected"
    pub phase: String,
    pub tail_id: String,
    pub severity: String,
}

impl ReconnectNotice {
    pub fn new(phase: &str, tail_id: &str, severity: &str) -> Self {
        ReconnectNotice {
            event_type: "reconnect_notice".to_string(),
            schema_version: SCHEMA_VERSION,
            phase: phase.to_string(),
            tail_id: tail_id.to_string(),
            severity: severity.to_string(),
        }
    }
}

/// Terminal event explaining an orderly shutdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cutoff {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// "max_duration" or "max_logs"
    pub reason: String,
    pub tail_id: String,
    pub session: u64,
    pub count: u64,
}

impl Cutoff {
    pub fn new(reason: &str, tail_id: &str, session: u64, count: u64) -> Self {
        Cutoff {
            event_type: "cutoff_reached".to_string(),
            schema_version: SCHEMA_VERSION,
            reason: reason.to_string(),
            tail_id: tail_id.to_string(),
            session,
            count,
        }
    }
}

/// Advises consumers to discard buffered context for the named session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearBuffer {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// "session_end" or "relaunch"
    pub reason: String,
    pub tail_id: String,
    pub session: u64,
    pub hints: Vec<String>,
}

impl ClearBuffer {
    pub fn new(reason: &str, tail_id: &str, session: u64) -> Self {
        ClearBuffer {
            event_type: "clear_buffer".to_string(),
            schema_version: SCHEMA_VERSION,
            reason: reason.to_string(),
            tail_id: tail_id.to_string(),
            session,
            hints: vec![
                "Discard buffered log context for this session".to_string(),
                "Later sessions start from a fresh app state".to_string(),
            ],
        }
    }
}

/// Tail-scoped guidance for automated consumers, emitted once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHints {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub tail_id: String,
    pub session: u64,
    pub contract_version: u32,
    pub recommended_scope: String,
    pub hints: Vec<String>,
}

impl AgentHints {
    pub fn new(tail_id: &str, session: u64, hints: Vec<String>) -> Self {
        AgentHints {
            event_type: "agent_hints".to_string(),
            schema_version: SCHEMA_VERSION,
            tail_id: tail_id.to_string(),
            session,
            contract_version: CONTRACT_VERSION,
            recommended_scope: "tail_id + latest session only".to_string(),
            hints,
        }
    }
}

/// A trigger is about to run (or was skipped under saturation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub tail_id: String,
    pub session: u64,
    pub trigger_type: String,
    pub command: String,
    pub message: String,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResult {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub tail_id: String,
    pub session: u64,
    pub trigger_type: String,
    pub command: String,
    /// Absent when the command was killed by a timeout.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub stdout_bytes: u64,
    pub stderr_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerError {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub tail_id: String,
    pub session: u64,
    pub command: String,
    pub error: String,
}

/// Structured failure; never silent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorEvent {
    pub fn new(code: &str, message: &str) -> Self {
        ErrorEvent {
            event_type: "error".to_string(),
            schema_version: SCHEMA_VERSION,
            code: code.to_string(),
            message: message.to_string(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }
}

/// Terminal marker for replay runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayComplete {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub count: u64,
}

impl ReplayComplete {
    pub fn new(count: u64) -> Self {
        ReplayComplete {
            event_type: "replay_complete".to_string(),
            schema_version: SCHEMA_VERSION,
            count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total: u64,
    pub counts: LevelCounts,
    pub unique_patterns: u64,
    pub new_patterns: u64,
}

/// Single-object result of the offline analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub summary: AnalysisSummary,
    pub patterns: Vec<crate::patterns::EnhancedPatternMatch>,
}

impl Analysis {
    pub fn new(
        summary: AnalysisSummary,
        patterns: Vec<crate::patterns::EnhancedPatternMatch>,
    ) -> Self {
        Analysis {
            event_type: "analysis".to_string(),
            schema_version: SCHEMA_VERSION,
            summary,
            patterns,
        }
    }
}
