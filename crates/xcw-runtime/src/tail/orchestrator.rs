use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use xcw_engine::{DedupeFilter, Pipeline, Tracker};
use xcw_output::{
    AgentHints, ClearBuffer, Cutoff, Emitter, ErrorEvent, Heartbeat, LevelCounts, LogEvent, Ready,
    ReconnectNotice, Summary, TopMessage,
};
use xcw_simulator::{Device, StreamNotice, StreamOptions, Supervisor};
use xcw_types::{LogEntry, LogLevel, CONTRACT_VERSION, SCHEMA_VERSION};

use crate::resume::{load_resume_state, save_resume_state, ResumeState};
use crate::trigger::TriggerExecutor;

const LOOP_TICK: Duration = Duration::from_millis(100);
const FUNNEL_CAPACITY: usize = 256;
const TOP_MESSAGES: usize = 5;

/// Why a tail run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Cancelled,
    MaxLogs,
    MaxDuration,
    StreamFailed,
}

#[derive(Debug, Clone)]
pub struct TailOutcome {
    pub reason: EndReason,
    pub total_logs: u64,
}

impl TailOutcome {
    /// Cutoffs and cancellation are graceful; only a dead stream is a
    /// process-level failure.
    pub fn is_failure(&self) -> bool {
        self.reason == EndReason::StreamFailed
    }
}

/// Static configuration of one tail invocation.
#[derive(Debug, Clone, Default)]
pub struct TailConfig {
    pub app: String,
    pub min_level: Option<LogLevel>,
    pub exclude_subsystems: Vec<String>,
    pub heartbeat: Duration,
    pub summary_interval: Duration,
    pub session_idle: Option<Duration>,
    pub max_logs: Option<u64>,
    pub max_duration: Option<Duration>,
    pub output: Option<PathBuf>,
    pub resume: bool,
    /// Resume file override; defaults to `<state-dir>/resume/<app>.json`.
    pub resume_path: Option<PathBuf>,
    /// Respawn/backoff override; production keeps the default policy.
    pub supervisor_policy: Option<xcw_simulator::supervisor::SupervisorPolicy>,
}

/// The tail run: owns the supervisor, tracker, filters and emitter wiring
/// for one (device, bundle) attachment, and multiplexes their events into
/// the NDJSON stream.
pub struct Tail {
    config: TailConfig,
    device: Device,
    tail_id: String,
    emitter: Arc<Emitter>,
    pipeline: Pipeline,
    dedupe: Option<DedupeFilter>,
    triggers: Option<TriggerExecutor>,
    cancel: Arc<AtomicBool>,
}

enum TailEvent {
    Entry(Box<LogEntry>),
    Notice(StreamNotice),
}

impl Tail {
    pub fn new(
        config: TailConfig,
        device: Device,
        emitter: Arc<Emitter>,
        pipeline: Pipeline,
        dedupe: Option<DedupeFilter>,
    ) -> Self {
        let tail_id = format!("tail-{}", &Uuid::new_v4().simple().to_string()[..8]);
        Tail {
            config,
            device,
            tail_id,
            emitter,
            pipeline,
            dedupe,
            triggers: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tail_id(&self) -> &str {
        &self.tail_id
    }

    /// Shared flag observed by the event loop; SIGINT handlers set it.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Watch mode: fan matching entries out to trigger commands.
    pub fn set_triggers(&mut self, triggers: TriggerExecutor) {
        self.triggers = Some(triggers);
    }

    pub fn run(self, source: Arc<dyn xcw_simulator::StreamSource>) -> Result<TailOutcome> {
        if let Some(output) = &self.config.output {
            self.emitter.set_output_path(output.clone());
        }

        let resume_path = self.resume_path()?;
        let start = self.resume_start(&resume_path);

        let opts = StreamOptions {
            mode: xcw_simulator::StreamMode::Live,
            bundle_id: self.config.app.clone(),
            min_level: self.config.min_level,
            start,
            exclude_subsystems: self.config.exclude_subsystems.clone(),
        };

        let policy = self.config.supervisor_policy.clone().unwrap_or_default();
        let mut supervisor = match Supervisor::start_with_policy(source, &self.device.udid, opts, policy)
        {
            Ok(supervisor) => supervisor,
            Err(err) => {
                let _ = self
                    .emitter
                    .error(&ErrorEvent::new(err.code(), &err.to_string()));
                return Err(err.into());
            }
        };

        let _ = self.emitter.ready(&Ready::new(
            &self.device.name,
            &self.device.udid,
            &self.config.app,
            &self.tail_id,
            1,
        ));
        let _ = self.emitter.agent_hints(&AgentHints::new(
            &self.tail_id,
            1,
            super::default_hints(),
        ));

        let (funnel_tx, funnel_rx) = sync_channel(FUNNEL_CAPACITY);
        let forwarders = spawn_forwarders(&mut supervisor, funnel_tx);

        let tracker = Tracker::new(
            &self.config.app,
            &self.device.name,
            &self.device.udid,
            &self.tail_id,
        );

        let outcome = self.event_loop(funnel_rx, &tracker, &resume_path);

        supervisor.stop();
        for handle in forwarders {
            let _ = handle.join();
        }

        Ok(outcome)
    }

    fn event_loop(
        &self,
        funnel: Receiver<TailEvent>,
        tracker: &Tracker,
        resume_path: &Option<PathBuf>,
    ) -> TailOutcome {
        let started = Instant::now();
        let deadline = self.config.max_duration.map(|d| started + d);
        let mut next_heartbeat = started + self.config.heartbeat;
        let mut next_summary = started + self.config.summary_interval;

        let mut totals = Totals::new(self.config.max_logs);
        let reason;

        'main: loop {
            if self.cancel.load(Ordering::SeqCst) {
                reason = EndReason::Cancelled;
                break;
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let _ = self.emitter.cutoff(&Cutoff::new(
                        "max_duration",
                        &self.tail_id,
                        tracker.current_session(),
                        totals.emitted,
                    ));
                    reason = EndReason::MaxDuration;
                    break;
                }
            }

            match funnel.recv_timeout(LOOP_TICK) {
                Ok(TailEvent::Entry(entry)) => {
                    match self.handle_entry(*entry, tracker, &mut totals, resume_path) {
                        EntryOutcome::Continue => {}
                        EntryOutcome::Cutoff => {
                            reason = EndReason::MaxLogs;
                            break 'main;
                        }
                    }
                }
                Ok(TailEvent::Notice(notice)) => {
                    if self.handle_notice(notice) {
                        reason = EndReason::StreamFailed;
                        break 'main;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if self.cancel.load(Ordering::SeqCst) {
                        reason = EndReason::Cancelled;
                    } else {
                        let _ = self.emitter.error(&ErrorEvent::new(
                            "STREAM_FAILED",
                            "log stream ended unexpectedly",
                        ));
                        reason = EndReason::StreamFailed;
                    }
                    break;
                }
            }

            let now = Instant::now();

            if !self.config.heartbeat.is_zero() && now >= next_heartbeat {
                if totals.since_heartbeat == 0 {
                    let _ = self.emitter.heartbeat(&Heartbeat {
                        event_type: "heartbeat".to_string(),
                        schema_version: SCHEMA_VERSION,
                        timestamp: Utc::now().to_rfc3339(),
                        uptime_seconds: started.elapsed().as_secs(),
                        logs_since_last: 0,
                        tail_id: self.tail_id.clone(),
                        contract_version: CONTRACT_VERSION,
                        latest_session: tracker.current_session(),
                        last_seen_timestamp: totals.last_log_rfc3339(),
                    });
                }
                totals.since_heartbeat = 0;
                next_heartbeat = now + self.config.heartbeat;
            }

            if !self.config.summary_interval.is_zero() && now >= next_summary {
                self.emit_summary(tracker, &mut totals);
                next_summary = now + self.config.summary_interval;
            }

            if let Some(idle) = self.config.session_idle {
                if let Some(end) = tracker.check_idle(idle) {
                    let session = end.session;
                    let _ = self.emitter.session_end(&end);
                    let _ = self.emitter.clear_buffer(&ClearBuffer::new(
                        "session_end",
                        &self.tail_id,
                        session,
                    ));
                    if let Some(dedupe) = &self.dedupe {
                        dedupe.reset();
                    }
                    self.persist_resume(resume_path, &totals);
                }
            }
        }

        self.drain(tracker, &mut totals, resume_path);

        TailOutcome {
            reason,
            total_logs: totals.emitted,
        }
    }

    fn handle_entry(
        &self,
        entry: LogEntry,
        tracker: &Tracker,
        totals: &mut Totals,
        resume_path: &Option<PathBuf>,
    ) -> EntryOutcome {
        if let Some(change) = tracker.check_entry(&entry) {
            if let Some(end) = change.end {
                let session = end.session;
                let _ = self.emitter.session_end(&end);
                let _ = self.emitter.clear_buffer(&ClearBuffer::new(
                    "relaunch",
                    &self.tail_id,
                    session,
                ));
                if let Some(dedupe) = &self.dedupe {
                    dedupe.reset();
                }
                self.persist_resume(resume_path, totals);
            }
            if let Some(start) = change.start {
                let _ = self.emitter.session_start(&start);
            }
            if let Some(debug) = change.debug {
                let _ = self.emitter.session_debug(&debug);
            }
        }

        if !self.pipeline.matches(&entry) {
            return EntryOutcome::Continue;
        }

        if let Some(dedupe) = &self.dedupe {
            if !dedupe.check(&entry.message).emit {
                return EntryOutcome::Continue;
            }
        }

        // max-logs cutoff fires instead of emitting the entry past the
        // budget.
        if totals.remaining == Some(0) {
            let _ = self.emitter.cutoff(&Cutoff::new(
                "max_logs",
                &self.tail_id,
                tracker.current_session(),
                totals.emitted,
            ));
            return EntryOutcome::Cutoff;
        }

        let session = tracker.current_session();
        let _ = self.emitter.log(&LogEvent::new(&entry, &self.tail_id, session));
        totals.record(&entry);

        if let Some(triggers) = &self.triggers {
            triggers.on_entry(&entry, session);
        }

        EntryOutcome::Continue
    }

    /// Returns true when the notice is fatal for the whole tail.
    fn handle_notice(&self, notice: StreamNotice) -> bool {
        match notice {
            StreamNotice::Decode { message, dropped } => {
                let detail = if dropped > 0 {
                    format!("log decode warning: {} ({} more dropped)", message, dropped)
                } else {
                    format!("log decode warning: {}", message)
                };
                let _ = self.emitter.note(&detail);
                false
            }
            StreamNotice::Reconnecting { .. } => {
                let _ = self.emitter.reconnect(&ReconnectNotice::new(
                    "reconnecting",
                    &self.tail_id,
                    "warn",
                ));
                false
            }
            StreamNotice::Reconnected => {
                let _ = self.emitter.reconnect(&ReconnectNotice::new(
                    "reconnected",
                    &self.tail_id,
                    "info",
                ));
                false
            }
            StreamNotice::Fatal { code, message } => {
                let _ = self.emitter.error(&ErrorEvent::new(code, &message));
                true
            }
        }
    }

    fn emit_summary(&self, tracker: &Tracker, totals: &mut Totals) {
        let suppressed = self
            .dedupe
            .as_ref()
            .map(|d| d.take_suppressed())
            .unwrap_or(0);

        if totals.interval_counts.total() == 0 && suppressed == 0 {
            return;
        }

        let interval_seconds = self.config.summary_interval.as_secs().max(1);
        let errors_per_minute = (totals.interval_counts.error + totals.interval_counts.fault)
            as f64
            * 60.0
            / interval_seconds as f64;

        let _ = self.emitter.summary(&Summary {
            event_type: "summary".to_string(),
            schema_version: SCHEMA_VERSION,
            tail_id: self.tail_id.clone(),
            session: tracker.current_session(),
            contract_version: CONTRACT_VERSION,
            interval_seconds,
            counts: std::mem::take(&mut totals.interval_counts),
            errors_per_minute,
            top_errors: totals.take_top_messages(),
            suppressed,
        });
    }

    fn drain(&self, tracker: &Tracker, totals: &mut Totals, resume_path: &Option<PathBuf>) {
        // Flush whatever the summary interval had not reported yet.
        self.emit_summary(tracker, totals);

        if let Some(end) = tracker.final_summary() {
            let _ = self.emitter.session_end(&end);
        }

        self.persist_resume(resume_path, totals);
        self.emitter.close_output();
        let _ = self.emitter.flush();
    }

    fn resume_path(&self) -> Result<Option<PathBuf>> {
        if !self.config.resume && self.config.resume_path.is_none() {
            return Ok(None);
        }
        match &self.config.resume_path {
            Some(path) => Ok(Some(path.clone())),
            None => Ok(Some(crate::resume::default_resume_path(&self.config.app)?)),
        }
    }

    /// With `--resume`, the previous run's last log timestamp becomes the
    /// stream's `--start`, skipping already-emitted logs.
    fn resume_start(&self, resume_path: &Option<PathBuf>) -> Option<String> {
        if !self.config.resume {
            return None;
        }
        let path = resume_path.as_ref()?;
        let state = load_resume_state(path).ok()??;
        state.last_log_timestamp
    }

    fn persist_resume(&self, resume_path: &Option<PathBuf>, totals: &Totals) {
        let Some(path) = resume_path else { return };

        let mut state = match load_resume_state(path) {
            Ok(Some(state)) => state,
            _ => ResumeState::new(&self.config.app, &self.device.udid),
        };
        state.app = self.config.app.clone();
        state.udid = self.device.udid.clone();
        state.last_seen_timestamp = Some(Utc::now().to_rfc3339());
        if let Some(ts) = totals.last_log_timestamp {
            state.last_log_timestamp = Some(ts.to_rfc3339_opts(SecondsFormat::Micros, true));
        }
        state.touch();

        let _ = save_resume_state(path, &state);
    }
}

enum EntryOutcome {
    Continue,
    Cutoff,
}

/// Counters the loop threads through: cumulative, per-heartbeat and
/// per-summary-interval views of the same stream.
struct Totals {
    emitted: u64,
    remaining: Option<u64>,
    since_heartbeat: u64,
    interval_counts: LevelCounts,
    interval_messages: HashMap<String, u64>,
    last_log_timestamp: Option<DateTime<Utc>>,
}

impl Totals {
    fn new(max_logs: Option<u64>) -> Self {
        Totals {
            emitted: 0,
            remaining: max_logs,
            since_heartbeat: 0,
            interval_counts: LevelCounts::default(),
            interval_messages: HashMap::new(),
            last_log_timestamp: None,
        }
    }

    fn record(&mut self, entry: &LogEntry) {
        self.emitted += 1;
        self.since_heartbeat += 1;
        self.interval_counts.record(entry.level);
        if entry.level >= LogLevel::Error {
            *self
                .interval_messages
                .entry(entry.message.clone())
                .or_insert(0) += 1;
        }
        self.last_log_timestamp = Some(entry.timestamp);
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(1);
        }
    }

    fn take_top_messages(&mut self) -> Vec<TopMessage> {
        let mut top: Vec<TopMessage> = self
            .interval_messages
            .drain()
            .map(|(message, count)| TopMessage { message, count })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
        top.truncate(TOP_MESSAGES);
        top
    }

    fn last_log_rfc3339(&self) -> Option<String> {
        self.last_log_timestamp.map(|ts| ts.to_rfc3339())
    }
}

fn spawn_forwarders(
    supervisor: &mut Supervisor,
    funnel: SyncSender<TailEvent>,
) -> Vec<std::thread::JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(logs) = supervisor.take_logs() {
        let tx = funnel.clone();
        handles.push(std::thread::spawn(move || {
            while let Ok(entry) = logs.recv() {
                if tx.send(TailEvent::Entry(Box::new(entry))).is_err() {
                    break;
                }
            }
        }));
    }

    if let Some(notices) = supervisor.take_notices() {
        handles.push(std::thread::spawn(move || {
            while let Ok(notice) = notices.recv() {
                if funnel.send(TailEvent::Notice(notice)).is_err() {
                    break;
                }
            }
        }));
    }

    handles
}
