use std::sync::Mutex;
use std::time::{Duration, Instant};

use xcw_types::{LogEntry, LogLevel, SessionDebug, SessionEnd, SessionStart, SessionSummary};

/// Lifecycle events produced by a tracker check. `end` always precedes
/// `start` on the wire when both are present.
#[derive(Debug, Default)]
pub struct SessionChange {
    pub end: Option<SessionEnd>,
    pub start: Option<SessionStart>,
    pub debug: Option<SessionDebug>,
}

#[derive(Debug)]
struct TrackerState {
    initialized: bool,
    session: u64,
    pid: i64,
    image_uuid: String,
    started: Instant,
    last_qualifying: Instant,
    log_count: u64,
    error_count: u64,
    fault_count: u64,
}

impl TrackerState {
    fn summary(&self) -> SessionSummary {
        SessionSummary {
            total_logs: self.log_count,
            errors: self.error_count,
            faults: self.fault_count,
            duration_seconds: self.started.elapsed().as_secs(),
        }
    }

    fn update_counts(&mut self, level: LogLevel) {
        match level {
            LogLevel::Error => self.error_count += 1,
            LogLevel::Fault => self.fault_count += 1,
            _ => {}
        }
    }

    fn begin(&mut self, pid: i64, image_uuid: &str, level: LogLevel) {
        self.initialized = true;
        self.pid = pid;
        self.image_uuid = image_uuid.to_string();
        self.started = Instant::now();
        self.last_qualifying = self.started;
        self.log_count = 1;
        self.error_count = 0;
        self.fault_count = 0;
        self.update_counts(level);
    }
}

/// Watches log entries for app relaunches: a changed PID or a changed
/// binary image UUID (reinstall at the same PID) rolls the session over.
pub struct Tracker {
    app: String,
    simulator: String,
    udid: String,
    tail_id: String,
    state: Mutex<TrackerState>,
}

impl Tracker {
    pub fn new(app: &str, simulator: &str, udid: &str, tail_id: &str) -> Self {
        let now = Instant::now();
        Tracker {
            app: app.to_string(),
            simulator: simulator.to_string(),
            udid: udid.to_string(),
            tail_id: tail_id.to_string(),
            state: Mutex::new(TrackerState {
                initialized: false,
                session: 0,
                pid: 0,
                image_uuid: String::new(),
                started: now,
                last_qualifying: now,
                log_count: 0,
                error_count: 0,
                fault_count: 0,
            }),
        }
    }

    /// Only entries from the traced bundle (subsystem equals the bundle or
    /// starts with `<bundle>.`) participate in session accounting.
    fn qualifies(&self, entry: &LogEntry) -> bool {
        entry.subsystem == self.app
            || entry
                .subsystem
                .strip_prefix(&self.app)
                .is_some_and(|rest| rest.starts_with('.'))
    }

    pub fn check_entry(&self, entry: &LogEntry) -> Option<SessionChange> {
        let mut state = self.state.lock().unwrap();

        if !self.qualifies(entry) {
            // Non-bundle entries still count toward the open session.
            if state.initialized {
                state.log_count += 1;
                state.update_counts(entry.level);
            }
            return None;
        }

        state.last_qualifying = Instant::now();

        if !state.initialized {
            state.session += 1;
            state.begin(entry.pid, &entry.image_uuid, entry.level);
            let session = state.session;

            return Some(SessionChange {
                end: None,
                start: Some(SessionStart::new(
                    session,
                    entry.pid,
                    None,
                    &self.app,
                    &self.simulator,
                    &self.udid,
                    &self.tail_id,
                    &entry.image_uuid,
                )),
                debug: Some(self.debug(session, None, entry.pid, None, "first_log")),
            });
        }

        let pid_changed = entry.pid > 0 && entry.pid != state.pid;
        let image_changed = !entry.image_uuid.is_empty()
            && !state.image_uuid.is_empty()
            && entry.image_uuid != state.image_uuid;

        if pid_changed || image_changed {
            let previous_session = state.session;
            let previous_pid = state.pid;
            let summary = state.summary();

            state.session += 1;
            state.begin(entry.pid, &entry.image_uuid, entry.level);
            let session = state.session;

            let reason = if pid_changed { "relaunch" } else { "image_change" };

            return Some(SessionChange {
                end: Some(SessionEnd::new(
                    previous_session,
                    previous_pid,
                    summary,
                    &self.tail_id,
                )),
                start: Some(SessionStart::new(
                    session,
                    entry.pid,
                    Some(previous_pid),
                    &self.app,
                    &self.simulator,
                    &self.udid,
                    &self.tail_id,
                    &entry.image_uuid,
                )),
                debug: Some(self.debug(
                    session,
                    Some(previous_session),
                    entry.pid,
                    Some(previous_pid),
                    reason,
                )),
            });
        }

        state.log_count += 1;
        state.update_counts(entry.level);
        None
    }

    /// Driven by the orchestrator's timer. Closes the open session when no
    /// qualifying entry has been seen for `idle`; the next qualifying
    /// entry then opens a fresh session without a relaunch alert.
    pub fn check_idle(&self, idle: Duration) -> Option<SessionEnd> {
        let mut state = self.state.lock().unwrap();
        if !state.initialized || state.last_qualifying.elapsed() < idle {
            return None;
        }

        let end = SessionEnd::new(state.session, state.pid, state.summary(), &self.tail_id)
            .with_reason("idle_timeout");

        state.initialized = false;
        state.pid = 0;
        state.image_uuid.clear();

        Some(end)
    }

    /// Closes the last open session at shutdown, if any.
    pub fn final_summary(&self) -> Option<SessionEnd> {
        let state = self.state.lock().unwrap();
        if !state.initialized {
            return None;
        }
        Some(SessionEnd::new(
            state.session,
            state.pid,
            state.summary(),
            &self.tail_id,
        ))
    }

    pub fn current_session(&self) -> u64 {
        self.state.lock().unwrap().session
    }

    /// (session, pid, logs, errors, faults) snapshot.
    pub fn stats(&self) -> (u64, i64, u64, u64, u64) {
        let state = self.state.lock().unwrap();
        (
            state.session,
            state.pid,
            state.log_count,
            state.error_count,
            state.fault_count,
        )
    }

    fn debug(
        &self,
        session: u64,
        prev_session: Option<u64>,
        pid: i64,
        prev_pid: Option<i64>,
        reason: &str,
    ) -> SessionDebug {
        SessionDebug {
            event_type: "session_debug".to_string(),
            schema_version: xcw_types::SCHEMA_VERSION,
            tail_id: self.tail_id.clone(),
            session,
            prev_session,
            pid,
            prev_pid,
            reason: reason.to_string(),
        }
    }
}
