//! End-to-end orchestrator scenarios driven through a channel-backed
//! stream source, watching the NDJSON output as it appears.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use xcw_engine::{DedupeFilter, DedupeMode, Pipeline};
use xcw_output::{Emitter, OutputFormat};
use xcw_runtime::{EndReason, Tail, TailConfig, TailOutcome, TriggerConfig, TriggerExecutor};
use xcw_simulator::{Device, StreamHandle, StreamOptions, StreamSource};
use xcw_testing::{raw_line, raw_line_with, ChannelSource, LineFeeder, SharedBuf};

const BUNDLE: &str = "com.ex";

fn device() -> Device {
    Device {
        name: "iPhone 17 Pro".to_string(),
        udid: "UDID-TEST".to_string(),
        state: "Booted".to_string(),
        is_available: true,
    }
}

struct Harness {
    out: SharedBuf,
    feeder: LineFeeder,
    cancel: Arc<AtomicBool>,
    run: JoinHandle<anyhow::Result<TailOutcome>>,
}

impl Harness {
    fn start(config: TailConfig) -> Self {
        Self::start_with(config, None, None)
    }

    fn start_with(
        config: TailConfig,
        dedupe: Option<DedupeFilter>,
        triggers: Option<TriggerConfig>,
    ) -> Self {
        let out = SharedBuf::new();
        let err = SharedBuf::new();
        let emitter = Arc::new(Emitter::with_writers(
            Box::new(out.clone()),
            Box::new(err.clone()),
            OutputFormat::Ndjson,
            false,
            false,
        ));

        let mut tail = Tail::new(config, device(), emitter.clone(), Pipeline::default(), dedupe);
        if let Some(trigger_config) = triggers {
            let executor = TriggerExecutor::new(trigger_config, emitter, tail.tail_id());
            tail.set_triggers(executor);
        }
        let cancel = tail.cancel_flag();

        let (source, feeder) = ChannelSource::new();
        let source = Arc::new(source);
        let run = std::thread::spawn(move || tail.run(source));

        Harness {
            out,
            feeder,
            cancel,
            run,
        }
    }

    fn wait_for<F: Fn(&SharedBuf) -> bool>(&self, pred: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if pred(&self.out) {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("condition not met; stream so far:\n{}", self.out.contents());
    }

    /// Stops feeding, cancels, and returns the outcome.
    fn shutdown(self) -> (TailOutcome, SharedBuf) {
        self.cancel.store(true, Ordering::SeqCst);
        drop(self.feeder);
        let outcome = self.run.join().unwrap().unwrap();
        (outcome, self.out)
    }

    /// For scenarios that end on their own (cutoff): just unblock EOF and
    /// join.
    fn join(self) -> (TailOutcome, SharedBuf) {
        drop(self.feeder);
        let outcome = self.run.join().unwrap().unwrap();
        (outcome, self.out)
    }
}

fn base_config() -> TailConfig {
    TailConfig {
        app: BUNDLE.to_string(),
        heartbeat: Duration::from_secs(3600),
        summary_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

#[test]
fn happy_tail_emits_ready_session_logs_and_final_end() {
    let h = Harness::start(base_config());

    for i in 0..3 {
        h.feeder.push(raw_line(111, "Info", BUNDLE, &format!("log {}", i)));
    }
    h.wait_for(|out| out.events_of("log").len() == 3);

    let (outcome, out) = h.shutdown();
    assert_eq!(outcome.reason, EndReason::Cancelled);
    assert!(!outcome.is_failure());
    assert_eq!(outcome.total_logs, 3);

    let types = out.event_types();
    assert_eq!(types[0], "ready");
    assert_eq!(types[1], "agent_hints");

    let start = &out.events_of("session_start")[0];
    assert_eq!(start["session"], 1);
    assert_eq!(start["pid"], 111);
    assert!(start.get("alert").is_none());

    let ends = out.events_of("session_end");
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0]["session"], 1);
    assert_eq!(ends[0]["summary"]["total_logs"], 3);

    // The session begins before its first log is emitted.
    let start_idx = types.iter().position(|t| t == "session_start").unwrap();
    let first_log_idx = types.iter().position(|t| t == "log").unwrap();
    assert!(start_idx < first_log_idx);
}

#[test]
fn relaunch_rolls_session_with_clear_buffer_between() {
    let h = Harness::start(base_config());

    h.feeder.push(raw_line(111, "Info", BUNDLE, "one"));
    h.feeder.push(raw_line(111, "Info", BUNDLE, "two"));
    h.feeder.push(raw_line(222, "Info", BUNDLE, "after relaunch"));
    h.wait_for(|out| out.events_of("session_start").len() == 2);

    let (_, out) = h.shutdown();

    let starts = out.events_of("session_start");
    assert_eq!(starts[1]["session"], 2);
    assert_eq!(starts[1]["pid"], 222);
    assert_eq!(starts[1]["previous_pid"], 111);
    assert_eq!(starts[1]["alert"], "APP_RELAUNCHED");

    // session_end(1) strictly precedes clear_buffer(relaunch) which
    // strictly precedes session_start(2).
    let types = out.event_types();
    let end_idx = types.iter().position(|t| t == "session_end").unwrap();
    let clear_idx = types.iter().position(|t| t == "clear_buffer").unwrap();
    let second_start_idx = types
        .iter()
        .enumerate()
        .filter(|(_, t)| *t == "session_start")
        .map(|(i, _)| i)
        .nth(1)
        .unwrap();
    assert!(end_idx < clear_idx && clear_idx < second_start_idx);

    let clear = &out.events_of("clear_buffer")[0];
    assert_eq!(clear["reason"], "relaunch");
}

#[test]
fn image_uuid_change_rolls_session_at_same_pid() {
    let h = Harness::start(base_config());

    h.feeder.push(raw_line_with(111, "U1", "Info", BUNDLE, "before"));
    h.feeder.push(raw_line_with(111, "U2", "Info", BUNDLE, "after reinstall"));
    h.wait_for(|out| out.events_of("session_start").len() == 2);

    let (_, out) = h.shutdown();
    let starts = out.events_of("session_start");
    assert_eq!(starts[1]["session"], 2);
    assert_eq!(starts[1]["pid"], 111);
    assert_eq!(out.events_of("session_end")[0]["session"], 1);
}

#[test]
fn max_logs_cutoff_fires_instead_of_third_log() {
    let mut config = base_config();
    config.max_logs = Some(2);
    let h = Harness::start(config);

    for i in 0..3 {
        h.feeder.push(raw_line(111, "Info", BUNDLE, &format!("log {}", i)));
    }
    h.wait_for(|out| !out.events_of("cutoff_reached").is_empty());

    let (outcome, out) = h.join();
    assert_eq!(outcome.reason, EndReason::MaxLogs);
    assert!(!outcome.is_failure());

    let cutoff = &out.events_of("cutoff_reached")[0];
    assert_eq!(cutoff["reason"], "max_logs");
    assert_eq!(cutoff["count"], 2);
    assert_eq!(out.events_of("log").len(), 2);
}

#[test]
fn max_duration_cutoff_terminates_idle_tail() {
    let mut config = base_config();
    config.max_duration = Some(Duration::from_millis(300));
    let h = Harness::start(config);

    h.wait_for(|out| !out.events_of("cutoff_reached").is_empty());
    let (outcome, out) = h.join();

    assert_eq!(outcome.reason, EndReason::MaxDuration);
    assert_eq!(out.events_of("cutoff_reached")[0]["reason"], "max_duration");
}

#[test]
fn consecutive_dedupe_suppresses_run_and_reports_on_summary() {
    let h = Harness::start_with(
        base_config(),
        Some(DedupeFilter::new(DedupeMode::Consecutive)),
        None,
    );

    for _ in 0..5 {
        h.feeder.push(raw_line(111, "Info", BUNDLE, "same message"));
    }
    h.feeder.push(raw_line(111, "Info", BUNDLE, "different"));
    h.wait_for(|out| out.events_of("log").len() == 2);

    let (_, out) = h.shutdown();
    assert_eq!(out.events_of("log").len(), 2);

    // Drain emits the pending summary carrying the suppressed count.
    let summaries = out.events_of("summary");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0]["suppressed"], 4);
}

#[test]
fn heartbeat_fires_only_while_idle() {
    let mut config = base_config();
    config.heartbeat = Duration::from_millis(250);
    let h = Harness::start(config);

    h.wait_for(|out| !out.events_of("heartbeat").is_empty());
    let (_, out) = h.shutdown();

    let hb = &out.events_of("heartbeat")[0];
    assert_eq!(hb["logs_since_last"], 0);
    assert_eq!(hb["contract_version"], 1);
}

#[test]
fn idle_timeout_closes_session_and_next_entry_opens_fresh_one() {
    let mut config = base_config();
    config.session_idle = Some(Duration::from_millis(250));
    let h = Harness::start(config);

    h.feeder.push(raw_line(111, "Info", BUNDLE, "before idle"));
    h.wait_for(|out| {
        out.events_of("session_end")
            .iter()
            .any(|e| e["reason"] == "idle_timeout")
    });

    h.feeder.push(raw_line(111, "Info", BUNDLE, "after idle"));
    h.wait_for(|out| out.events_of("session_start").len() == 2);

    let (_, out) = h.shutdown();
    let starts = out.events_of("session_start");
    assert_eq!(starts[1]["session"], 2);
    assert!(starts[1].get("alert").is_none());

    let idle_end = out
        .events_of("session_end")
        .into_iter()
        .find(|e| e["reason"] == "idle_timeout")
        .unwrap();
    assert_eq!(idle_end["session"], 1);
    assert!(!out.events_of("clear_buffer").is_empty());
}

#[cfg(unix)]
#[test]
fn trigger_timeout_does_not_block_log_processing() {
    let triggers = TriggerConfig {
        on_error: Some("sleep 10".to_string()),
        timeout: Duration::from_secs(1),
        cooldown: Duration::ZERO,
        ..Default::default()
    };
    let h = Harness::start_with(base_config(), None, Some(triggers));

    h.feeder.push(raw_line(111, "Error", BUNDLE, "boom"));
    h.wait_for(|out| !out.events_of("trigger").is_empty());

    // The very next entry must flow while the trigger is still running.
    let pushed = Instant::now();
    h.feeder.push(raw_line(111, "Info", BUNDLE, "still flowing"));
    h.wait_for(|out| out.events_of("log").len() == 2);
    assert!(pushed.elapsed() < Duration::from_millis(500));

    h.wait_for(|out| !out.events_of("trigger_result").is_empty());
    let (_, out) = h.shutdown();

    let result = &out.events_of("trigger_result")[0];
    assert_eq!(result["timed_out"], true);
    assert_eq!(result["exit_code"], serde_json::Value::Null);
}

#[test]
fn resume_state_is_persisted_and_seeds_next_start() {
    let dir = tempfile::TempDir::new().unwrap();
    let resume_path = dir.path().join("com.ex.json");

    let mut config = base_config();
    config.resume_path = Some(resume_path.clone());
    let h = Harness::start(config);

    h.feeder.push(raw_line(111, "Info", BUNDLE, "remembered"));
    h.wait_for(|out| out.events_of("log").len() == 1);
    let _ = h.shutdown();

    let state = xcw_runtime::load_resume_state(&resume_path).unwrap().unwrap();
    assert_eq!(state.app, BUNDLE);
    let last_log = state.last_log_timestamp.clone().unwrap();
    assert!(last_log.starts_with("2025-12-11T10:00:00"));

    // A resuming tail hands the stored timestamp to the stream source.
    struct Recording {
        inner: ChannelSource,
        start: Arc<Mutex<Option<String>>>,
    }
    impl StreamSource for Recording {
        fn open(&self, udid: &str, opts: &StreamOptions) -> xcw_simulator::Result<StreamHandle> {
            *self.start.lock().unwrap() = opts.start.clone();
            self.inner.open(udid, opts)
        }
    }

    let (inner, feeder) = ChannelSource::new();
    let seen_start = Arc::new(Mutex::new(None));
    let source = Arc::new(Recording {
        inner,
        start: seen_start.clone(),
    });

    let emitter = Arc::new(Emitter::with_writers(
        Box::new(SharedBuf::new()),
        Box::new(SharedBuf::new()),
        OutputFormat::Ndjson,
        false,
        false,
    ));
    let mut config = base_config();
    config.resume = true;
    config.resume_path = Some(resume_path);
    let tail = Tail::new(config, device(), emitter, Pipeline::default(), None);
    let cancel = tail.cancel_flag();

    let run = std::thread::spawn(move || tail.run(source));
    cancel.store(true, Ordering::SeqCst);
    drop(feeder);
    run.join().unwrap().unwrap();

    assert_eq!(seen_start.lock().unwrap().as_deref(), Some(last_log.as_str()));
}

#[test]
fn stream_failure_after_budget_is_fatal_with_error_event() {
    // A source that dies instantly on every open after the first.
    let out = SharedBuf::new();
    let emitter = Arc::new(Emitter::with_writers(
        Box::new(out.clone()),
        Box::new(SharedBuf::new()),
        OutputFormat::Ndjson,
        false,
        false,
    ));

    let source = Arc::new(xcw_testing::ScriptedSource::new(vec![vec![raw_line(
        111, "Info", BUNDLE, "only line",
    )]]));

    let mut config = base_config();
    config.supervisor_policy = Some(xcw_simulator::supervisor::SupervisorPolicy {
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(10),
        respawn_window: Duration::from_secs(60),
        max_respawns_per_window: 3,
    });
    let tail = Tail::new(config, device(), emitter, Pipeline::default(), None);
    let outcome = tail.run(source).unwrap();

    assert_eq!(outcome.reason, EndReason::StreamFailed);
    assert!(outcome.is_failure());

    let errors = out.events_of("error");
    assert_eq!(errors[0]["code"], "STREAM_FAILED");
    assert!(!out.events_of("reconnect_notice").is_empty());
}
