use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use xcw_types::{SessionDebug, SessionEnd, SessionStart};

use crate::events::*;
use crate::rotation::Rotation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Ndjson,
    Text,
}

struct Inner {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
    rotation: Rotation,
    format: OutputFormat,
    quiet: bool,
    verbose: bool,
}

/// Serializes every event to exactly one output line. A single internal
/// mutex guarantees no two lines interleave, whatever context emits.
///
/// In text mode, human-facing events render as prose while agent-only
/// events (heartbeat, cutoff, reconnect, agent_hints, clear_buffer) stay
/// JSON on stderr so automated consumers can still read them out-of-band.
/// Quiet suppresses stderr prose, never NDJSON.
pub struct Emitter {
    inner: Mutex<Inner>,
}

impl Emitter {
    pub fn new(format: OutputFormat, quiet: bool, verbose: bool) -> Self {
        Emitter::with_writers(
            Box::new(io::stdout()),
            Box::new(io::stderr()),
            format,
            quiet,
            verbose,
        )
    }

    pub fn with_writers(
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
        format: OutputFormat,
        quiet: bool,
        verbose: bool,
    ) -> Self {
        Emitter {
            inner: Mutex::new(Inner {
                out,
                err,
                rotation: Rotation::new(None),
                format,
                quiet,
                verbose,
            }),
        }
    }

    /// Configures per-session file rotation. The file opens at the next
    /// `session_start`.
    pub fn set_output_path(&self, template: PathBuf) {
        let mut inner = self.inner.lock().unwrap();
        inner.rotation = Rotation::new(Some(template));
    }

    pub fn ready(&self, event: &Ready) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.format {
            OutputFormat::Ndjson => write_json(&mut inner, event),
            OutputFormat::Text => {
                tee_rotation(&mut inner, event)?;
                prose(
                    &mut inner,
                    &format!(
                        "Watching {} on {} ({})",
                        event.app, event.simulator, event.udid
                    ),
                )
            }
        }
    }

    pub fn log(&self, event: &LogEvent) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.format {
            OutputFormat::Ndjson => write_json(&mut inner, event),
            OutputFormat::Text => {
                tee_rotation(&mut inner, event)?;
                let line = format!(
                    "{} {} {}[{}] {}",
                    event.timestamp.format("%H:%M:%S%.3f"),
                    event.level.letter(),
                    event.process,
                    event.pid,
                    event.message
                );
                writeln!(inner.out, "{}", line)
            }
        }
    }

    /// Rotates the output file before writing the event, so the new
    /// session's file carries its own `session_start`.
    pub fn session_start(&self, event: &SessionStart) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.rotation.open_for_session(event.session)?;
        match inner.format {
            OutputFormat::Ndjson => write_json(&mut inner, event),
            OutputFormat::Text => {
                tee_rotation(&mut inner, event)?;
                let alert = match event.alert.as_deref() {
                    Some(alert) => format!(" [{}]", alert),
                    None => String::new(),
                };
                prose(
                    &mut inner,
                    &format!(
                        "Session {} started (pid {}){}",
                        event.session, event.pid, alert
                    ),
                )
            }
        }
    }

    pub fn session_end(&self, event: &SessionEnd) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.format {
            OutputFormat::Ndjson => write_json(&mut inner, event),
            OutputFormat::Text => {
                tee_rotation(&mut inner, event)?;
                prose(
                    &mut inner,
                    &format!(
                        "Session {} ended: {} logs, {} errors, {} faults in {}s",
                        event.session,
                        event.summary.total_logs,
                        event.summary.errors,
                        event.summary.faults,
                        event.summary.duration_seconds
                    ),
                )
            }
        }
    }

    /// Only written in verbose mode.
    pub fn session_debug(&self, event: &SessionDebug) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.verbose {
            return Ok(());
        }
        agent_json(&mut inner, event)
    }

    pub fn heartbeat(&self, event: &Heartbeat) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        agent_json(&mut inner, event)
    }

    pub fn summary(&self, event: &Summary) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.format {
            OutputFormat::Ndjson => write_json(&mut inner, event),
            OutputFormat::Text => {
                tee_rotation(&mut inner, event)?;
                prose(
                    &mut inner,
                    &format!(
                        "Summary: {} logs ({} errors, {} faults), {} suppressed",
                        event.counts.total(),
                        event.counts.error,
                        event.counts.fault,
                        event.suppressed
                    ),
                )
            }
        }
    }

    pub fn reconnect(&self, event: &ReconnectNotice) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        agent_json(&mut inner, event)
    }

    pub fn cutoff(&self, event: &Cutoff) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        agent_json(&mut inner, event)
    }

    pub fn clear_buffer(&self, event: &ClearBuffer) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        agent_json(&mut inner, event)
    }

    pub fn agent_hints(&self, event: &AgentHints) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        agent_json(&mut inner, event)
    }

    pub fn trigger(&self, event: &TriggerEvent) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.format {
            OutputFormat::Ndjson => write_json(&mut inner, event),
            OutputFormat::Text => {
                tee_rotation(&mut inner, event)?;
                let note = if event.skipped.unwrap_or(false) {
                    format!("[TRIGGER:{}] skipped: saturated", event.trigger_type)
                } else {
                    format!("[TRIGGER:{}] running: {}", event.trigger_type, event.command)
                };
                prose(&mut inner, &note)
            }
        }
    }

    pub fn trigger_result(&self, event: &TriggerResult) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.format {
            OutputFormat::Ndjson => write_json(&mut inner, event),
            OutputFormat::Text => {
                tee_rotation(&mut inner, event)?;
                let outcome = if event.timed_out {
                    "timed out".to_string()
                } else {
                    format!("exit {}", event.exit_code.unwrap_or(-1))
                };
                prose(
                    &mut inner,
                    &format!(
                        "[TRIGGER:{}] {} after {}ms",
                        event.trigger_type, outcome, event.duration_ms
                    ),
                )
            }
        }
    }

    pub fn trigger_error(&self, event: &TriggerError) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.format {
            OutputFormat::Ndjson => write_json(&mut inner, event),
            OutputFormat::Text => {
                tee_rotation(&mut inner, event)?;
                prose(
                    &mut inner,
                    &format!("[TRIGGER ERROR] {}: {}", event.command, event.error),
                )
            }
        }
    }

    /// Never silent: text mode writes to stderr regardless of quiet.
    pub fn error(&self, event: &ErrorEvent) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.format {
            OutputFormat::Ndjson => write_json(&mut inner, event),
            OutputFormat::Text => {
                tee_rotation(&mut inner, event)?;
                let hint = match &event.hint {
                    Some(hint) => format!(" (hint: {})", hint),
                    None => String::new(),
                };
                writeln!(inner.err, "Error [{}]: {}{}", event.code, event.message, hint)
            }
        }
    }

    pub fn analysis(&self, event: &Analysis) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        write_json(&mut inner, event)
    }

    pub fn replay_complete(&self, event: &ReplayComplete) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        write_json(&mut inner, event)
    }

    /// Free-form stderr prose, quiet-gated. Used by handlers for startup
    /// banners in text mode.
    pub fn note(&self, message: &str) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        prose(&mut inner, message)
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.out.flush()?;
        inner.err.flush()?;
        inner.rotation.flush()
    }

    /// Flushes and closes the rotation file; called once while draining.
    pub fn close_output(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.rotation.close();
    }
}

fn encode<T: Serialize>(event: &T) -> io::Result<String> {
    serde_json::to_string(event).map_err(io::Error::other)
}

/// NDJSON to the primary writer plus the rotation file.
fn write_json<T: Serialize>(inner: &mut Inner, event: &T) -> io::Result<()> {
    let line = encode(event)?;
    inner.rotation.write_line(&line)?;
    writeln!(inner.out, "{}", line)
}

/// Agent-only events: NDJSON on stdout normally, NDJSON on stderr when
/// text format is selected.
fn agent_json<T: Serialize>(inner: &mut Inner, event: &T) -> io::Result<()> {
    let line = encode(event)?;
    inner.rotation.write_line(&line)?;
    match inner.format {
        OutputFormat::Ndjson => writeln!(inner.out, "{}", line),
        OutputFormat::Text => writeln!(inner.err, "{}", line),
    }
}

fn tee_rotation<T: Serialize>(inner: &mut Inner, event: &T) -> io::Result<()> {
    let line = encode(event)?;
    inner.rotation.write_line(&line)
}

fn prose(inner: &mut Inner, message: &str) -> io::Result<()> {
    if inner.quiet {
        return Ok(());
    }
    writeln!(inner.err, "{}", message)
}
