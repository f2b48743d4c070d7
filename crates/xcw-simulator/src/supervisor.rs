use std::collections::VecDeque;
use std::io::BufRead;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use xcw_types::LogEntry;

use crate::error::Result;
use crate::schema::parse_stream_line;
use crate::stream::{StreamMode, StreamOptions, StreamSource};

const LOG_CHANNEL_CAPACITY: usize = 256;
const NOTICE_CHANNEL_CAPACITY: usize = 64;
const DECODE_NOTICE_INTERVAL: Duration = Duration::from_secs(1);
const STOP_GRACE: Duration = Duration::from_secs(2);
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Non-fatal and fatal out-of-band events from the stream.
#[derive(Debug, Clone)]
pub enum StreamNotice {
    /// A single line failed to decode. Rate-limited to one notice per
    /// second; `dropped` counts lines swallowed since the last notice.
    Decode { message: String, dropped: u64 },

    /// The child exited unexpectedly; a respawn is scheduled.
    Reconnecting { attempt: u32, delay_ms: u64 },

    /// A respawn succeeded and the stream is live again.
    Reconnected,

    /// The respawn budget is exhausted; the supervisor has stopped.
    Fatal { code: &'static str, message: String },
}

/// Respawn and backoff policy. Defaults match the production contract;
/// tests shrink the delays.
#[derive(Debug, Clone)]
pub struct SupervisorPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub respawn_window: Duration,
    pub max_respawns_per_window: usize,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        SupervisorPolicy {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            respawn_window: Duration::from_secs(60),
            max_respawns_per_window: 10,
        }
    }
}

/// Owns the backing subprocess: spawns it, parses its output into the
/// bounded log channel, respawns it with backoff when it dies, and tears
/// it down cooperatively on `stop`.
pub struct Supervisor {
    logs: Option<Receiver<LogEntry>>,
    notices: Option<Receiver<StreamNotice>>,
    cancel: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
    reader: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn start(
        source: Arc<dyn StreamSource>,
        udid: &str,
        opts: StreamOptions,
    ) -> Result<Supervisor> {
        Supervisor::start_with_policy(source, udid, opts, SupervisorPolicy::default())
    }

    pub fn start_with_policy(
        source: Arc<dyn StreamSource>,
        udid: &str,
        opts: StreamOptions,
        policy: SupervisorPolicy,
    ) -> Result<Supervisor> {
        let (logs_tx, logs_rx) = sync_channel(LOG_CHANNEL_CAPACITY);
        let (notices_tx, notices_rx) = sync_channel(NOTICE_CHANNEL_CAPACITY);
        let cancel = Arc::new(AtomicBool::new(false));
        let child_slot = Arc::new(Mutex::new(None));

        // The first open happens synchronously so device and permission
        // failures surface as hard errors instead of reconnect churn.
        let handle = source.open(udid, &opts)?;
        *child_slot.lock().unwrap() = handle.child;

        let worker = ReaderWorker {
            source,
            udid: udid.to_string(),
            opts,
            policy,
            logs_tx,
            notices_tx,
            cancel: cancel.clone(),
            child_slot: child_slot.clone(),
        };

        let reader = std::thread::Builder::new()
            .name("xcw-stream-reader".to_string())
            .spawn(move || worker.run(handle.reader))?;

        Ok(Supervisor {
            logs: Some(logs_rx),
            notices: Some(notices_rx),
            cancel,
            child: child_slot,
            reader: Some(reader),
        })
    }

    pub fn logs(&self) -> &Receiver<LogEntry> {
        self.logs.as_ref().expect("log receiver was taken")
    }

    pub fn notices(&self) -> &Receiver<StreamNotice> {
        self.notices.as_ref().expect("notice receiver was taken")
    }

    /// Hands the log channel to a consumer thread. Later `logs()` calls
    /// are a programming error.
    pub fn take_logs(&mut self) -> Option<Receiver<LogEntry>> {
        self.logs.take()
    }

    pub fn take_notices(&mut self) -> Option<Receiver<StreamNotice>> {
        self.notices.take()
    }

    /// Cancels, terminates the child (grace, then force) and joins the
    /// reader thread. Safe to call more than once.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);

        if let Some(mut child) = self.child.lock().unwrap().take() {
            terminate_child(&mut child, STOP_GRACE);
        }

        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReaderWorker {
    source: Arc<dyn StreamSource>,
    udid: String,
    opts: StreamOptions,
    policy: SupervisorPolicy,
    logs_tx: SyncSender<LogEntry>,
    notices_tx: SyncSender<StreamNotice>,
    cancel: Arc<AtomicBool>,
    child_slot: Arc<Mutex<Option<Child>>>,
}

enum ReadEnd {
    Eof,
    Shutdown,
}

impl ReaderWorker {
    fn run(self, mut reader: Box<dyn std::io::BufRead + Send>) {
        let mut backoff = self.policy.initial_backoff;
        let mut respawns: VecDeque<Instant> = VecDeque::new();
        let mut attempt: u32 = 0;
        let mut decode = DecodeLimiter::new();

        'stream: loop {
            match self.drain(&mut reader, &mut decode) {
                ReadEnd::Shutdown => break 'stream,
                ReadEnd::Eof => {}
            }

            if self.cancelled() {
                break 'stream;
            }

            self.reap_child();

            // Respawn loop: each attempt, successful or not, counts
            // against the sliding window budget.
            loop {
                let now = Instant::now();
                while let Some(front) = respawns.front() {
                    if now.duration_since(*front) > self.policy.respawn_window {
                        respawns.pop_front();
                    } else {
                        break;
                    }
                }
                if respawns.len() >= self.policy.max_respawns_per_window {
                    self.notify(StreamNotice::Fatal {
                        code: "STREAM_FAILED",
                        message: format!(
                            "log stream died {} times within {:?}; giving up",
                            respawns.len(),
                            self.policy.respawn_window
                        ),
                    });
                    break 'stream;
                }
                respawns.push_back(now);
                attempt += 1;

                self.notify(StreamNotice::Reconnecting {
                    attempt,
                    delay_ms: backoff.as_millis() as u64,
                });

                if !self.sleep_cancellable(backoff) {
                    break 'stream;
                }
                backoff = (backoff * 2).min(self.policy.max_backoff);

                match self.source.open(&self.udid, &self.opts) {
                    Ok(handle) => {
                        *self.child_slot.lock().unwrap() = handle.child;
                        reader = handle.reader;
                        backoff = self.policy.initial_backoff;
                        self.notify(StreamNotice::Reconnected);
                        continue 'stream;
                    }
                    Err(_) => continue,
                }
            }
        }
    }

    /// Reads lines until EOF, a read error, cancellation, or a dropped
    /// consumer.
    fn drain(
        &self,
        reader: &mut Box<dyn std::io::BufRead + Send>,
        decode: &mut DecodeLimiter,
    ) -> ReadEnd {
        let mut line = String::new();
        loop {
            if self.cancelled() {
                return ReadEnd::Shutdown;
            }

            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => return ReadEnd::Eof,
                Ok(_) => {}
                Err(_) => return ReadEnd::Eof,
            }

            let entry = match parse_stream_line(&line) {
                None => continue,
                Some(Err(err)) => {
                    if let Some(dropped) = decode.admit() {
                        self.notify(StreamNotice::Decode {
                            message: err.to_string(),
                            dropped,
                        });
                    }
                    continue;
                }
                Some(Ok(entry)) => entry,
            };

            if !self.admits(&entry) {
                continue;
            }

            if !self.send_entry(entry) {
                return ReadEnd::Shutdown;
            }
        }
    }

    fn admits(&self, entry: &LogEntry) -> bool {
        if let Some(min) = self.opts.min_level {
            if entry.level.priority() < min.priority() {
                return false;
            }
        }
        !subsystem_excluded(&entry.subsystem, &self.opts.exclude_subsystems)
    }

    /// Blocking-with-backpressure send that stays cancellable: the bounded
    /// channel makes the supervisor wait for the orchestrator instead of
    /// dropping entries.
    fn send_entry(&self, entry: LogEntry) -> bool {
        let mut pending = entry;
        loop {
            if self.cancelled() {
                return false;
            }
            match self.logs_tx.try_send(pending) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    pending = back;
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    fn notify(&self, notice: StreamNotice) {
        // Notices are advisory; a slow consumer loses them rather than
        // stalling the stream.
        let _ = self.notices_tx.try_send(notice);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn sleep_cancellable(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        while Instant::now() < deadline {
            if self.cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            std::thread::sleep(CANCEL_POLL.min(remaining));
        }
        !self.cancelled()
    }

    fn reap_child(&self) {
        if let Some(mut child) = self.child_slot.lock().unwrap().take() {
            let _ = child.wait();
        }
    }
}

struct DecodeLimiter {
    last_notice: Option<Instant>,
    dropped: u64,
}

impl DecodeLimiter {
    fn new() -> Self {
        DecodeLimiter {
            last_notice: None,
            dropped: 0,
        }
    }

    /// Returns `Some(dropped_since_last)` when a notice may be emitted now.
    fn admit(&mut self) -> Option<u64> {
        let now = Instant::now();
        match self.last_notice {
            Some(last) if now.duration_since(last) < DECODE_NOTICE_INTERVAL => {
                self.dropped += 1;
                None
            }
            _ => {
                self.last_notice = Some(now);
                Some(std::mem::take(&mut self.dropped))
            }
        }
    }
}

fn subsystem_excluded(subsystem: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => subsystem.starts_with(prefix),
        None => subsystem == pattern,
    })
}

fn terminate_child(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    unsafe {
        libc::kill(child.id() as i32, libc::SIGTERM);
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => std::thread::sleep(CANCEL_POLL),
            Err(_) => break,
        }
    }

    let _ = child.kill();
    let _ = child.wait();
}
