use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use regex::Regex;

use xcw_output::{Emitter, TriggerError, TriggerEvent, TriggerResult};
use xcw_types::{LogEntry, SCHEMA_VERSION};

const CAPTURE_LIMIT: usize = 64 * 1024;
const KILL_GRACE: Duration = Duration::from_secs(1);
const WAIT_POLL: Duration = Duration::from_millis(25);

/// What happens to trigger command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerOutput {
    #[default]
    Discard,
    Inherit,
    Capture,
}

#[derive(Debug, Clone)]
enum TriggerKind {
    Error,
    Fault,
    Pattern(Regex),
}

#[derive(Debug, Clone)]
struct TriggerSpec {
    kind: TriggerKind,
    label: String,
    command: String,
}

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub on_error: Option<String>,
    pub on_fault: Option<String>,
    pub on_pattern: Vec<(Regex, String)>,
    pub cooldown: Duration,
    pub timeout: Duration,
    pub max_parallel: usize,
    pub output: TriggerOutput,
    pub use_shell: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig {
            on_error: None,
            on_fault: None,
            on_pattern: Vec::new(),
            cooldown: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
            max_parallel: 4,
            output: TriggerOutput::Discard,
            use_shell: true,
        }
    }
}

impl TriggerConfig {
    pub fn has_triggers(&self) -> bool {
        self.on_error.is_some() || self.on_fault.is_some() || !self.on_pattern.is_empty()
    }
}

/// Dispatches configured commands on matching log entries.
///
/// Every trigger keeps its own cooldown clock. Dispatch is bounded by a
/// counting semaphore; at saturation a skipped `trigger` event is emitted
/// and log processing continues, it never blocks on a running command.
pub struct TriggerExecutor {
    specs: Vec<TriggerSpec>,
    cooldown: Duration,
    timeout: Duration,
    max_parallel: usize,
    output: TriggerOutput,
    use_shell: bool,
    tail_id: String,
    emitter: Arc<Emitter>,
    active: Arc<AtomicUsize>,
    last_fired: Mutex<Vec<Option<Instant>>>,
}

impl TriggerExecutor {
    pub fn new(config: TriggerConfig, emitter: Arc<Emitter>, tail_id: &str) -> Self {
        let mut specs = Vec::new();
        if let Some(command) = config.on_error {
            specs.push(TriggerSpec {
                kind: TriggerKind::Error,
                label: "error".to_string(),
                command,
            });
        }
        if let Some(command) = config.on_fault {
            specs.push(TriggerSpec {
                kind: TriggerKind::Fault,
                label: "fault".to_string(),
                command,
            });
        }
        for (pattern, command) in config.on_pattern {
            specs.push(TriggerSpec {
                label: format!("pattern:{}", pattern.as_str()),
                kind: TriggerKind::Pattern(pattern),
                command,
            });
        }

        let fired = vec![None; specs.len()];
        TriggerExecutor {
            specs,
            cooldown: config.cooldown,
            timeout: config.timeout,
            max_parallel: config.max_parallel.max(1),
            output: config.output,
            use_shell: config.use_shell,
            tail_id: tail_id.to_string(),
            emitter,
            active: Arc::new(AtomicUsize::new(0)),
            last_fired: Mutex::new(fired),
        }
    }

    pub fn on_entry(&self, entry: &LogEntry, session: u64) {
        self.on_entry_at(entry, session, Instant::now());
    }

    /// Clock-injected variant used by cooldown tests.
    pub fn on_entry_at(&self, entry: &LogEntry, session: u64, now: Instant) {
        for (index, spec) in self.specs.iter().enumerate() {
            let fires = match &spec.kind {
                TriggerKind::Error => entry.level == xcw_types::LogLevel::Error,
                TriggerKind::Fault => entry.level == xcw_types::LogLevel::Fault,
                TriggerKind::Pattern(pattern) => pattern.is_match(&entry.message),
            };
            if !fires {
                continue;
            }

            {
                let mut fired = self.last_fired.lock().unwrap();
                if let Some(last) = fired[index] {
                    if now.duration_since(last) < self.cooldown {
                        continue;
                    }
                }
                fired[index] = Some(now);
            }

            self.dispatch(spec, entry, session);
        }
    }

    fn dispatch(&self, spec: &TriggerSpec, entry: &LogEntry, session: u64) {
        if !try_acquire(&self.active, self.max_parallel) {
            let _ = self.emitter.trigger(&TriggerEvent {
                event_type: "trigger".to_string(),
                schema_version: SCHEMA_VERSION,
                tail_id: self.tail_id.clone(),
                session,
                trigger_type: spec.label.clone(),
                command: spec.command.clone(),
                message: entry.message.clone(),
                level: entry.level,
                skipped: Some(true),
                reason: Some("saturation".to_string()),
            });
            return;
        }

        let _ = self.emitter.trigger(&TriggerEvent {
            event_type: "trigger".to_string(),
            schema_version: SCHEMA_VERSION,
            tail_id: self.tail_id.clone(),
            session,
            trigger_type: spec.label.clone(),
            command: spec.command.clone(),
            message: entry.message.clone(),
            level: entry.level,
            skipped: None,
            reason: None,
        });

        let invocation = Invocation {
            spec: spec.clone(),
            entry: entry.clone(),
            session,
            timeout: self.timeout,
            output: self.output,
            use_shell: self.use_shell,
            tail_id: self.tail_id.clone(),
            emitter: self.emitter.clone(),
            active: self.active.clone(),
        };

        // Token is released by the invocation itself, whatever the outcome.
        std::thread::Builder::new()
            .name("xcw-trigger".to_string())
            .spawn(move || invocation.run())
            .map_err(|e| {
                self.active.fetch_sub(1, Ordering::SeqCst);
                e
            })
            .ok();
    }

    /// Currently running trigger commands.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

fn try_acquire(active: &AtomicUsize, limit: usize) -> bool {
    active
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            if current < limit {
                Some(current + 1)
            } else {
                None
            }
        })
        .is_ok()
}

struct Invocation {
    spec: TriggerSpec,
    entry: LogEntry,
    session: u64,
    timeout: Duration,
    output: TriggerOutput,
    use_shell: bool,
    tail_id: String,
    emitter: Arc<Emitter>,
    active: Arc<AtomicUsize>,
}

impl Invocation {
    fn run(self) {
        let started = Instant::now();
        let result = self.execute(started);
        self.active.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(result) => {
                let _ = self.emitter.trigger_result(&result);
            }
            Err(message) => {
                let _ = self.emitter.trigger_error(&TriggerError {
                    event_type: "trigger_error".to_string(),
                    schema_version: SCHEMA_VERSION,
                    tail_id: self.tail_id.clone(),
                    session: self.session,
                    command: self.spec.command.clone(),
                    error: message,
                });
            }
        }
    }

    fn execute(&self, started: Instant) -> Result<TriggerResult, String> {
        let mut command = self.build_command()?;
        let mut child = command.spawn().map_err(|e| e.to_string())?;

        // Drain pipes concurrently so a chatty command can't fill its pipe
        // and wedge against the wait loop.
        let stdout_reader = child.stdout.take().map(spawn_capture);
        let stderr_reader = child.stderr.take().map(spawn_capture);

        let timed_out = !wait_with_timeout(&mut child, self.timeout);
        if timed_out {
            terminate(&mut child);
        }
        let status = child.try_wait().ok().flatten();
        let duration_ms = started.elapsed().as_millis() as u64;

        let (stdout, stdout_bytes) = join_capture(stdout_reader);
        let (stderr, stderr_bytes) = join_capture(stderr_reader);
        let capture = self.output == TriggerOutput::Capture;

        Ok(TriggerResult {
            event_type: "trigger_result".to_string(),
            schema_version: SCHEMA_VERSION,
            tail_id: self.tail_id.clone(),
            session: self.session,
            trigger_type: self.spec.label.clone(),
            command: self.spec.command.clone(),
            exit_code: if timed_out {
                None
            } else {
                status.and_then(|s| s.code())
            },
            duration_ms,
            timed_out,
            stdout_bytes,
            stderr_bytes,
            stdout: if capture { Some(stdout) } else { None },
            stderr: if capture { Some(stderr) } else { None },
        })
    }

    fn build_command(&self) -> Result<Command, String> {
        let mut command = if self.use_shell {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.spec.command);
            c
        } else {
            // No-shell mode: whitespace tokenization, no quoting rules.
            let mut parts = self.spec.command.split_whitespace();
            let program = parts.next().ok_or_else(|| "empty command".to_string())?;
            let mut c = Command::new(program);
            c.args(parts);
            c
        };

        command
            .env("XCW_TRIGGER", &self.spec.label)
            .env("XCW_LEVEL", self.entry.level.as_str())
            .env("XCW_MESSAGE", &self.entry.message)
            .env("XCW_SUBSYSTEM", &self.entry.subsystem)
            .env("XCW_PROCESS", &self.entry.process)
            .env("XCW_TIMESTAMP", self.entry.timestamp.to_rfc3339())
            .stdin(Stdio::null());

        match self.output {
            TriggerOutput::Discard => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
            TriggerOutput::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            TriggerOutput::Capture => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        Ok(command)
    }
}

/// Returns false on timeout.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(_) => return true,
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(WAIT_POLL);
    }
}

/// Graceful signal first, force-kill after one second.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    unsafe {
        libc::kill(child.id() as i32, libc::SIGTERM);
    }

    if !wait_with_timeout(child, KILL_GRACE) {
        let _ = child.kill();
    }
    let _ = child.wait();
}

type CaptureHandle = std::thread::JoinHandle<(Vec<u8>, u64)>;

/// Reads a pipe to EOF, keeping at most the first 64 KiB but counting
/// every byte.
fn spawn_capture<R: Read + Send + 'static>(mut reader: R) -> CaptureHandle {
    std::thread::spawn(move || {
        let mut kept = Vec::new();
        let mut total: u64 = 0;
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    total += n as u64;
                    if kept.len() < CAPTURE_LIMIT {
                        let room = CAPTURE_LIMIT - kept.len();
                        kept.extend_from_slice(&buf[..n.min(room)]);
                    }
                }
            }
        }
        (kept, total)
    })
}

fn join_capture(handle: Option<CaptureHandle>) -> (String, u64) {
    match handle {
        Some(handle) => match handle.join() {
            Ok((bytes, total)) => (String::from_utf8_lossy(&bytes).into_owned(), total),
            Err(_) => (String::new(), 0),
        },
        None => (String::new(), 0),
    }
}
