use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};

use xcw_types::LogLevel;

use crate::error::{Error, Result};

/// Live tailing vs a bounded historical read that ends at EOF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamMode {
    #[default]
    Live,
    Show,
}

/// What the supervisor asks of the backing stream.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub mode: StreamMode,

    pub bundle_id: String,

    /// Client-side minimum severity; entries below it are dropped before
    /// they reach the log channel.
    pub min_level: Option<LogLevel>,

    /// Timestamp handed to the subprocess as `--start` when resuming.
    pub start: Option<String>,

    /// Subsystems to drop client-side. A trailing `*` makes the pattern a
    /// prefix match.
    pub exclude_subsystems: Vec<String>,
}

/// A live connection to the backing log subprocess: a line reader over its
/// stdout plus the child handle used for termination. Test doubles leave
/// `child` empty.
pub struct StreamHandle {
    pub reader: Box<dyn BufRead + Send>,
    pub child: Option<Child>,
}

/// Factory for log stream connections. The supervisor never embeds
/// knowledge of the platform binary's argv; production uses
/// [`SimctlSource`], tests use a scripted double.
pub trait StreamSource: Send + Sync {
    fn open(&self, udid: &str, opts: &StreamOptions) -> Result<StreamHandle>;
}

/// Spawns `xcrun simctl spawn <udid> log stream --style json`.
#[derive(Debug, Default)]
pub struct SimctlSource;

impl SimctlSource {
    pub fn new() -> Self {
        SimctlSource
    }
}

impl StreamSource for SimctlSource {
    fn open(&self, udid: &str, opts: &StreamOptions) -> Result<StreamHandle> {
        let verb = match opts.mode {
            StreamMode::Live => "stream",
            StreamMode::Show => "show",
        };

        let mut command = Command::new("xcrun");
        command
            .args(["simctl", "spawn", udid, "log", verb, "--style", "json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        if let Some(level) = opts.min_level {
            // `log stream` only distinguishes these three tiers.
            let tier = match level {
                LogLevel::Debug => "debug",
                LogLevel::Info => "info",
                _ => "default",
            };
            command.args(["--level", tier]);
        }

        if let Some(start) = &opts.start {
            command.args(["--start", start]);
        }

        if !opts.bundle_id.is_empty() {
            let predicate = format!(
                "subsystem == \"{bundle}\" OR subsystem BEGINSWITH \"{bundle}.\"",
                bundle = opts.bundle_id
            );
            command.args(["--predicate", &predicate]);
        }

        let mut child = command
            .spawn()
            .map_err(|e| Error::Spawn(format!("xcrun: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("child stdout not captured".to_string()))?;

        Ok(StreamHandle {
            reader: Box::new(BufReader::new(stdout)),
            child: Some(child),
        })
    }
}
